//! Human-readable messages: the per-cycle digest and the daily stats report.
//! Pure rendering, no I/O.

pub mod formatter;
pub mod stats;

pub use formatter::{format_digest, format_digest_within, format_no_matches};
pub use stats::format_daily_stats;
