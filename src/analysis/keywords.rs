//! Static keyword tables for league quality and prominent participants.
//!
//! Matching is case-insensitive and anchored at a word start. Keys shorter
//! than [`STEM_MIN_CHARS`] must also end on a word boundary, so `inter` does
//! not hit "International"; longer keys may be stems (`молодеж`).

use crate::model::Sport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LeagueTier {
    Low,
    Mid,
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityBonus {
    None,
    Small,
    Large,
}

pub const STEM_MIN_CHARS: usize = 6;

struct SportKeywords {
    top_leagues: &'static [&'static str],
    low_leagues: &'static [&'static str],
    large_entities: &'static [&'static str],
    small_entities: &'static [&'static str],
}

const FOOTBALL: SportKeywords = SportKeywords {
    top_leagues: &[
        "premier league", "la liga", "laliga", "bundesliga", "serie a", "ligue 1",
        "champions league", "europa league", "eredivisie", "primeira liga",
        "премьер-лига", "лига чемпионов",
    ],
    low_leagues: &[
        "u19", "u20", "u21", "u23", "youth", "reserve", "amateur", "women's 2",
        "regional", "friendly", "молодеж", "любител",
    ],
    large_entities: &[
        "manchester city", "real madrid", "barcelona", "bayern", "liverpool",
        "arsenal", "paris saint-germain", "psg", "inter", "juventus",
    ],
    small_entities: &[
        "chelsea", "manchester united", "tottenham", "atletico", "dortmund",
        "napoli", "ac milan", "benfica", "porto", "ajax", "зенит",
    ],
};

const TENNIS: SportKeywords = SportKeywords {
    top_leagues: &[
        "grand slam", "australian open", "roland garros", "wimbledon", "us open",
        "atp masters", "wta 1000", "atp 500", "atp finals",
    ],
    low_leagues: &["itf", "utr", "futures", "junior", "exhibition"],
    large_entities: &[
        "sinner", "alcaraz", "djokovic", "sabalenka", "swiatek", "gauff",
    ],
    small_entities: &[
        "medvedev", "zverev", "rublev", "fritz", "rybakina", "pegula", "ruud",
    ],
};

const TABLE_TENNIS: SportKeywords = SportKeywords {
    top_leagues: &["wtt champions", "wtt star contender", "world championship", "olympic"],
    low_leagues: &["setka cup", "tt cup", "liga pro", "win cup", "czech liga"],
    large_entities: &["fan zhendong", "wang chuqin", "ma long", "sun yingsha"],
    small_entities: &["harimoto", "lin yun-ju", "moregard", "calderano", "ovtcharov"],
};

const HANDBALL: SportKeywords = SportKeywords {
    top_leagues: &[
        "ehf champions league", "bundesliga", "liqui moly", "asobal", "lnh",
        "starligue", "ehf euro", "world championship",
    ],
    low_leagues: &["u19", "u21", "youth", "2. liga", "division 2", "women 2"],
    large_entities: &[
        "thw kiel", "barcelona", "veszprem", "paris saint-germain", "psg",
        "sc magdeburg", "aalborg",
    ],
    small_entities: &[
        "flensburg", "füchse berlin", "fuchse berlin", "kielce", "szeged", "nantes",
    ],
};

fn keywords(sport: Sport) -> &'static SportKeywords {
    match sport {
        Sport::Football => &FOOTBALL,
        Sport::Tennis => &TENNIS,
        Sport::TableTennis => &TABLE_TENNIS,
        Sport::Handball => &HANDBALL,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let whole_word = needle.chars().count() < STEM_MIN_CHARS;
    haystack.match_indices(needle).any(|(start, matched)| {
        let starts_word = !haystack[..start].chars().next_back().is_some_and(is_word_char);
        let ends_word = !haystack[start + matched.len()..].chars().next().is_some_and(is_word_char);
        starts_word && (ends_word || !whole_word)
    })
}

fn matches_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|needle| contains_word(&lower, needle))
}

/// Top keywords win over low keywords; anything unmatched is mid-tier.
pub fn league_tier(sport: Sport, league: &str) -> LeagueTier {
    let table = keywords(sport);
    if matches_any(league, table.top_leagues) {
        LeagueTier::Top
    } else if matches_any(league, table.low_leagues) {
        LeagueTier::Low
    } else {
        LeagueTier::Mid
    }
}

pub fn entity_bonus(sport: Sport, participant: &str) -> EntityBonus {
    let table = keywords(sport);
    if matches_any(participant, table.large_entities) {
        EntityBonus::Large
    } else if matches_any(participant, table.small_entities) {
        EntityBonus::Small
    } else {
        EntityBonus::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_league_tier_case_insensitive() {
        assert_eq!(league_tier(Sport::Football, "England. PREMIER LEAGUE"), LeagueTier::Top);
        assert_eq!(league_tier(Sport::Football, "Premier League U21"), LeagueTier::Top);
        assert_eq!(league_tier(Sport::Football, "Spain. Segunda U19"), LeagueTier::Low);
        assert_eq!(league_tier(Sport::Football, "Latvia. Virsliga"), LeagueTier::Mid);
        assert_eq!(league_tier(Sport::Tennis, "ITF M25 Antalya"), LeagueTier::Low);
        assert_eq!(league_tier(Sport::TableTennis, "Setka Cup"), LeagueTier::Low);
    }

    #[test]
    fn test_entity_bonus() {
        assert_eq!(entity_bonus(Sport::Football, "Manchester City"), EntityBonus::Large);
        assert_eq!(entity_bonus(Sport::Football, "Chelsea FC"), EntityBonus::Small);
        assert_eq!(entity_bonus(Sport::Football, "Brighton"), EntityBonus::None);
        assert_eq!(entity_bonus(Sport::Handball, "THW Kiel"), EntityBonus::Large);
        assert_eq!(entity_bonus(Sport::Tennis, "J. Sinner"), EntityBonus::Large);
    }

    #[test]
    fn test_short_keys_match_whole_words_only() {
        assert_eq!(entity_bonus(Sport::Football, "Inter"), EntityBonus::Large);
        assert_eq!(entity_bonus(Sport::Football, "FC Internazionale"), EntityBonus::None);
        assert_eq!(entity_bonus(Sport::Football, "Internacional"), EntityBonus::None);
        assert_eq!(entity_bonus(Sport::Football, "Inter Miami"), EntityBonus::Large);
        assert_eq!(entity_bonus(Sport::Football, "Portimonense"), EntityBonus::None);
        assert_eq!(entity_bonus(Sport::Football, "FC Porto"), EntityBonus::Small);
        assert_eq!(league_tier(Sport::Tennis, "Split ITF"), LeagueTier::Low);
        assert_eq!(league_tier(Sport::Tennis, "Bitfinex Open"), LeagueTier::Mid);
    }

    #[test]
    fn test_long_keys_match_as_stems() {
        assert_eq!(league_tier(Sport::Football, "Россия. Молодежное первенство"), LeagueTier::Low);
        assert_eq!(league_tier(Sport::Football, "Amateur Cup"), LeagueTier::Low);
    }
}
