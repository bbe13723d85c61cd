//! Digest rendering in the channel's HTML subset (`<b>`, `<i>`, newlines).

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::analysis::parse::parse_minute;
use crate::model::clock::TZ_LABEL;
use crate::model::{Recommendation, RecommendationKind, Sport};

pub const DISCLAIMER: &str =
    "⚠️ <i>Informational picks only. Betting carries risk; no outcome is guaranteed.</i>";

const RATIONALE_WORDS: usize = 25;

/// Escape text for the channel's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `HH:MM MSK, DD.MM.YYYY`.
pub fn header_time(at: DateTime<FixedOffset>) -> String {
    format!("{} {TZ_LABEL}, {}", at.format("%H:%M"), at.format("%d.%m.%Y"))
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

fn sport_title(sport: Sport) -> &'static str {
    match sport {
        Sport::Football => "FOOTBALL",
        Sport::Tennis => "TENNIS",
        Sport::TableTennis => "TABLE TENNIS",
        Sport::Handball => "HANDBALL",
    }
}

fn percent(confidence: Decimal) -> Decimal {
    (confidence * dec!(100)).round()
}

fn clock_line(rec: &Recommendation) -> Option<String> {
    let snapshot = &rec.snapshot;
    let regulation = snapshot.sport.regulation_minutes()?;
    let minute = parse_minute(&snapshot.minute);
    let left = regulation.saturating_sub(minute);
    Some(format!("⏱ {minute}' (~{left} min to go)"))
}

fn render_entry(number: usize, rec: &Recommendation) -> String {
    let snapshot = &rec.snapshot;
    let mut lines = vec![format!(
        "<b>{number}. {} vs {}</b>",
        escape_html(snapshot.team1.trim()),
        escape_html(snapshot.team2.trim())
    )];

    let mut state = format!("📊 Score: {}", escape_html(snapshot.score.trim()));
    if let Some(clock) = clock_line(rec) {
        state.push_str(" | ");
        state.push_str(&clock);
    }
    lines.push(state);

    if !snapshot.league.trim().is_empty() {
        lines.push(format!("🏆 {}", escape_html(snapshot.league.trim())));
    }

    let label = match rec.kind {
        RecommendationKind::Win => "Pick",
        RecommendationKind::Total => "Total",
    };
    let mut pick = format!("✅ {label}: <b>{}</b>", escape_html(rec.value.trim()));
    if let Some(coefficient) = rec.coefficient {
        pick.push_str(&format!(" | Coef: {}", coefficient.round_dp(2)));
    }
    pick.push_str(&format!(" | Confidence: {}%", percent(rec.confidence)));
    lines.push(pick);

    lines.push(format!(
        "💬 <i>{}</i>",
        escape_html(&truncate_words(&rec.rationale, RATIONALE_WORDS))
    ));

    lines.join("\n")
}

/// Render one digest. Sports appear in fixed order, numbering runs across
/// the whole digest. An empty list renders the no-matches digest.
pub fn format_digest(recommendations: &[Recommendation], at: DateTime<FixedOffset>) -> String {
    let ordered = in_sport_order(recommendations);
    render_digest(&ordered, ordered.len(), at)
}

/// Like [`format_digest`], but the result never exceeds `max_chars`: entries
/// are dropped from the end and replaced by a count of what was left out.
pub fn format_digest_within(
    recommendations: &[Recommendation],
    at: DateTime<FixedOffset>,
    max_chars: usize,
) -> String {
    let ordered = in_sport_order(recommendations);
    let mut shown = ordered.len();
    loop {
        let digest = render_digest(&ordered, shown, at);
        if shown == 0 || digest.chars().count() <= max_chars {
            return digest;
        }
        shown -= 1;
    }
}

fn in_sport_order(recommendations: &[Recommendation]) -> Vec<&Recommendation> {
    Sport::ALL
        .iter()
        .flat_map(|sport| recommendations.iter().filter(move |rec| rec.sport() == *sport))
        .collect()
}

fn render_digest(ordered: &[&Recommendation], shown: usize, at: DateTime<FixedOffset>) -> String {
    if ordered.is_empty() {
        return format_no_matches(at);
    }

    let mut sections = vec![format!("🎯 <b>LIVE PICKS</b> | {}", header_time(at))];
    let visible = &ordered[..shown.min(ordered.len())];

    for sport in Sport::ALL {
        let mut section = vec![format!("{} <b>{}</b>", sport.emoji(), sport_title(sport))];
        for (index, rec) in visible.iter().enumerate().filter(|(_, rec)| rec.sport() == sport) {
            section.push(render_entry(index + 1, rec));
        }
        if section.len() > 1 {
            sections.push(section.join("\n\n"));
        }
    }

    let hidden = ordered.len() - visible.len();
    if hidden > 0 {
        sections.push(format!("➕ <i>{hidden} more picks recorded in the prediction log.</i>"));
    }

    sections.push(DISCLAIMER.to_string());
    sections.join("\n\n")
}

pub fn format_no_matches(at: DateTime<FixedOffset>) -> String {
    format!(
        "🎯 <b>LIVE PICKS</b> | {}\n\n\
         🔍 No eligible live matches right now.\n\
         The next scan runs on schedule.\n\n\
         {DISCLAIMER}",
        header_time(at)
    )
}
