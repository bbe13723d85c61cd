//! Fixed UTC+3 wall clock used for digests, log timestamps and day boundaries.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

pub const UTC_OFFSET_SECONDS: i32 = 3 * 3600;

/// Label printed next to local times.
pub const TZ_LABEL: &str = "MSK";

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(UTC_OFFSET_SECONDS).expect("UTC+3 is a valid offset")
}

pub fn to_local(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&local_offset())
}

pub fn now_local() -> DateTime<FixedOffset> {
    to_local(Utc::now())
}

pub fn today_local() -> NaiveDate {
    now_local().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_local_day_rolls_over_at_21_utc() {
        let late = Utc.with_ymd_and_hms(2026, 10, 19, 21, 30, 0).unwrap();
        let local = to_local(late);
        assert_eq!(local.hour(), 0);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
    }
}
