//! Card-based event lists.
//!
//! Each match is a `div.event-card` whose `data-*` attributes carry the
//! state; prices are nested `span.odd[data-outcome][data-value]` elements.
//! Cards without a `data-league` inherit `data-tournament` from the closest
//! enclosing section.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::data::http::{clean_text, PageFetcher};
use crate::data::SnapshotSource;
use crate::model::{MatchSnapshot, Sport};

pub const SOURCE_ID: &str = "eventcards";

pub struct EventCardsSource {
    fetcher: PageFetcher,
    urls: BTreeMap<Sport, String>,
}

impl EventCardsSource {
    pub fn new(fetcher: PageFetcher, urls: BTreeMap<Sport, String>) -> Self {
        Self { fetcher, urls }
    }
}

#[async_trait]
impl SnapshotSource for EventCardsSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, sport: Sport) -> Vec<MatchSnapshot> {
        let Some(url) = self.urls.get(&sport) else {
            return Vec::new();
        };

        match self.fetcher.get_text(url).await {
            Ok(html) => parse_page(sport, &html, url),
            Err(e) => {
                warn!(source = SOURCE_ID, sport = %sport, error = %e, "Source fetch failed");
                Vec::new()
            }
        }
    }
}

fn attr(card: &ElementRef<'_>, name: &str) -> Option<String> {
    card.value()
        .attr(name)
        .map(clean_text)
        .filter(|value| !value.is_empty())
}

fn inherited_tournament(card: &ElementRef<'_>) -> Option<String> {
    card.ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|parent| parent.value().attr("data-tournament"))
        .map(clean_text)
}

pub fn parse_page(sport: Sport, html: &str, page_url: &str) -> Vec<MatchSnapshot> {
    let (Ok(cards), Ok(odds_selector)) = (
        Selector::parse("div.event-card"),
        Selector::parse("span.odd[data-outcome][data-value]"),
    ) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut snapshots = Vec::new();
    for card in document.select(&cards) {
        let (Some(team1), Some(team2), Some(mut score)) = (
            attr(&card, "data-home"),
            attr(&card, "data-away"),
            attr(&card, "data-score"),
        ) else {
            debug!(source = SOURCE_ID, "Skipping incomplete event card");
            continue;
        };

        if let Some(games) = attr(&card, "data-games") {
            score = format!("{score} ({games})");
        }

        let odds = card
            .select(&odds_selector)
            .filter_map(|odd| {
                let outcome = odd.value().attr("data-outcome")?.trim().to_lowercase();
                let price = Decimal::from_str(odd.value().attr("data-value")?.trim()).ok()?;
                Some((outcome, price))
            })
            .collect();

        let url = card
            .value()
            .attr("data-link")
            .and_then(|link| base.as_ref()?.join(link).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| page_url.to_string());

        snapshots.push(MatchSnapshot {
            sport,
            team1,
            team2,
            score,
            minute: attr(&card, "data-clock").unwrap_or_default(),
            league: attr(&card, "data-league")
                .or_else(|| inherited_tournament(&card))
                .unwrap_or_default(),
            source: SOURCE_ID.to_string(),
            url,
            odds,
        });
    }

    snapshots
}
