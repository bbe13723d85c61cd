//! Daily stats message.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::digest::formatter::escape_html;
use crate::model::Sport;
use crate::tracker::stats::{DailyStats, OutcomeCounts, OTHER_SPORT};

const BUCKET_ORDER: [&str; 6] = ["0.90+", "0.85-0.89", "0.80-0.84", "0.75-0.79", "<0.75", "unrated"];

fn percent_label(rate: Option<Decimal>) -> String {
    match rate {
        Some(rate) => format!("{:.1}%", (rate * dec!(100)).round_dp(1)),
        None => "n/a".to_string(),
    }
}

fn counts_line(label: &str, counts: &OutcomeCounts) -> String {
    format!(
        "{label}: {}/{} won ({}), {} pending",
        counts.wins,
        counts.wins + counts.losses,
        percent_label(counts.win_rate()),
        counts.unknown
    )
}

pub fn format_daily_stats(stats: &DailyStats) -> String {
    let counts = &stats.counts;
    let mut lines = vec![
        format!("📈 <b>DAILY STATS</b> | {}", stats.date.format("%d.%m.%Y")),
        String::new(),
        format!("Total picks: {}", counts.total),
        format!(
            "Settled: {} (✅ {} | ❌ {} | ↩️ {})",
            stats.known, counts.wins, counts.losses, counts.pushes
        ),
        format!("Pending: {}", counts.unknown),
        format!("Win rate: <b>{}</b>", percent_label(stats.win_rate)),
    ];

    if !stats.by_sport.is_empty() {
        lines.push(String::new());
        lines.push("<b>By sport</b>".to_string());
        for sport in Sport::ALL {
            if let Some(c) = stats.by_sport.get(sport.as_str()) {
                lines.push(counts_line(&format!("{} {}", sport.emoji(), sport), c));
            }
        }
        if let Some(c) = stats.by_sport.get(OTHER_SPORT) {
            lines.push(counts_line(OTHER_SPORT, c));
        }
    }

    if !stats.by_confidence.is_empty() {
        lines.push(String::new());
        lines.push("<b>By confidence</b>".to_string());
        for bucket in BUCKET_ORDER {
            if let Some(c) = stats.by_confidence.get(bucket) {
                lines.push(counts_line(&escape_html(bucket), c));
            }
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clock::local_offset;
    use crate::tracker::stats::compute;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_empty_day_message() {
        let now = local_offset().with_ymd_and_hms(2026, 10, 19, 23, 50, 0).unwrap();
        let stats = compute(&[], NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(), now);
        let text = format_daily_stats(&stats);
        assert!(text.starts_with("📈 <b>DAILY STATS</b> | 19.10.2026"));
        assert!(text.contains("Total picks: 0"));
        assert!(text.contains("Win rate: <b>n/a</b>"));
        assert!(!text.contains("By sport"));
    }

    #[test]
    fn test_breakdowns_rendered_in_order() {
        let mut stats = compute(
            &[],
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            local_offset().with_ymd_and_hms(2026, 10, 19, 23, 50, 0).unwrap(),
        );
        stats.counts = OutcomeCounts { total: 4, wins: 3, losses: 1, pushes: 0, unknown: 0 };
        stats.known = 4;
        stats.win_rate = stats.counts.win_rate();
        stats.by_sport.insert("handball".into(), OutcomeCounts { total: 1, wins: 1, ..Default::default() });
        stats.by_sport.insert("football".into(), OutcomeCounts { total: 3, wins: 2, losses: 1, ..Default::default() });
        stats.by_confidence.insert("<0.75".into(), OutcomeCounts { total: 1, losses: 1, ..Default::default() });

        let text = format_daily_stats(&stats);
        assert!(text.contains("Win rate: <b>75.0%</b>"));
        let football = text.find("football: 2/3 won (66.7%)").unwrap();
        let handball = text.find("handball: 1/1 won (100.0%)").unwrap();
        assert!(football < handball);
        assert!(text.contains("&lt;0.75: 0/1 won (0.0%)"));
    }
}
