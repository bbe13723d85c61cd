//! Score and match-clock grammars.
//!
//! Minute grammar: decorations (`'`, `′`, whitespace) are stripped, stoppage
//! time `45+2` sums its parts, otherwise the leading digit run is the minute
//! (`2nd set` → 2). A clock with no digits parses as 0.

use crate::model::Sport;

/// Largest per-side count accepted from a score string. Anything bigger is
/// scraper noise.
pub const MAX_SCORE: u32 = 999;

/// Clock texts that mean the match is over, whatever the minute says.
const FINISHED_MARKERS: &[&str] = &[
    "ft", "finished", "ended", "full time", "aet", "завершен", "окончен",
];

/// Parse a raw match clock into whole minutes.
pub fn parse_minute(raw: &str) -> u32 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '\'' | '′' | '’') && !c.is_whitespace())
        .collect();

    cleaned
        .split('+')
        .map(leading_number)
        .fold(0u32, |acc, part| acc.saturating_add(part.unwrap_or(0)))
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// True when the clock text carries an explicit end-of-match marker.
pub fn has_finished_marker(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    FINISHED_MARKERS
        .iter()
        .any(|marker| lower == *marker || lower.starts_with(&format!("{marker} ")))
        || lower.contains("завершен")
        || lower.contains("окончен")
}

/// A clocked match whose minute exceeds regulation plus grace is treated as finished.
pub fn clock_finished(sport: Sport, raw_minute: &str) -> bool {
    if has_finished_marker(raw_minute) {
        return true;
    }
    match sport.regulation_minutes() {
        Some(regulation) => parse_minute(raw_minute) > regulation + sport.grace_minutes(),
        None => false,
    }
}

/// Goals scored by each side (football, handball).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalScore {
    pub home: u32,
    pub away: u32,
}

impl GoalScore {
    pub fn total(&self) -> u32 {
        self.home.saturating_add(self.away)
    }

    pub fn lead(&self) -> u32 {
        self.home.abs_diff(self.away)
    }
}

/// Sets won by each side plus the optional game score of the current set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetScore {
    pub home: u32,
    pub away: u32,
    pub games: Option<(u32, u32)>,
}

impl SetScore {
    /// Current-set games lead, positive when the home side is ahead.
    pub fn games_lead(&self) -> i32 {
        self.games
            .map(|(h, a)| signed_diff(h, a))
            .unwrap_or(0)
    }
}

/// `home - away` without overflow, saturating at the `i32` range.
pub fn signed_diff(home: u32, away: u32) -> i32 {
    let diff = i64::from(home) - i64::from(away);
    diff.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Parse an `H:A` goal score. Anything after a parenthesis (half-time score) is ignored.
pub fn parse_goals(raw: &str) -> Option<GoalScore> {
    let main = raw.split('(').next().unwrap_or_default();
    let (home, away) = parse_pair(main)?;
    Some(GoalScore { home, away })
}

/// Parse `S1-S2` or `S1-S2 (g1-g2)`. With several bracketed sets
/// (`1-0 (6-4, 3-1)`) the last one is the current set.
pub fn parse_sets(raw: &str) -> Option<SetScore> {
    let (sets_part, games_part) = match raw.split_once('(') {
        Some((sets, rest)) => (sets, Some(rest.trim_end().trim_end_matches(')'))),
        None => (raw, None),
    };
    let (home, away) = parse_pair(sets_part)?;
    let games = games_part
        .and_then(|g| g.split(',').last())
        .and_then(parse_pair);
    Some(SetScore { home, away, games })
}

fn parse_pair(raw: &str) -> Option<(u32, u32)> {
    let raw = raw.trim();
    let (left, right) = raw.split_once(':').or_else(|| raw.split_once('-'))?;
    let left: u32 = left.trim().parse().ok()?;
    let right: u32 = right.trim().parse().ok()?;
    (left <= MAX_SCORE && right <= MAX_SCORE).then_some((left, right))
}
