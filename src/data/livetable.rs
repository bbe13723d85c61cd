//! Row-based live-score tables.
//!
//! Layout: a `table.live-table` where `tr.league-header` rows name the league
//! for the `tr.match-row` rows that follow. Each match row carries
//! `td.minute`, `td.home`, `td.score`, `td.away`, an optional `td.games`
//! (racket sports, current set) and zero or more `td.odds[data-outcome]` cells.

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

pub const SOURCE_ID: &str = "livetable";

pub struct LiveTableSource {
    fetcher: PageFetcher,
    urls: BTreeMap<Sport, String>,
}

impl LiveTableSource {
    pub fn new(fetcher: PageFetcher, urls: BTreeMap<Sport, String>) -> Self {
        Self { fetcher, urls }
    }
}

#[async_trait]
impl SnapshotSource for LiveTableSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch(&self, sport: Sport) -> Vec<MatchSnapshot> {
        let Some(url) = self.urls.get(&sport) else {
            debug!(source = SOURCE_ID, sport = %sport, "No page configured for sport");
            return Vec::new();
        };

        match self.fetcher.get_text(url).await {
            Ok(html) => {
                let snapshots = parse_page(sport, &html, url);
                if snapshots.is_empty() {
                    debug!(source = SOURCE_ID, sport = %sport, "Page parsed with no live matches");
                }
                snapshots
            }
            Err(e) => {
                warn!(source = SOURCE_ID, sport = %sport, error = %e, "Source fetch failed");
                Vec::new()
            }
        }
    }
}

struct RowSelectors {
    rows: Selector,
    minute: Selector,
    home: Selector,
    away: Selector,
    score: Selector,
    games: Selector,
    odds: Selector,
}

impl RowSelectors {
    fn new() -> Option<Self> {
        Some(Self {
            rows: Selector::parse("table.live-table tr").ok()?,
            minute: Selector::parse("td.minute").ok()?,
            home: Selector::parse("td.home").ok()?,
            away: Selector::parse("td.away").ok()?,
            score: Selector::parse("td.score").ok()?,
            games: Selector::parse("td.games").ok()?,
            odds: Selector::parse("td.odds[data-outcome]").ok()?,
        })
    }
}

fn has_class(row: &ElementRef<'_>, class: &str) -> bool {
    row.value().classes().any(|c| c == class)
}

fn cell_text(row: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(|cell| clean_text(&cell.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

/// Parse one page into snapshots. Rows missing a team or score are skipped.
pub fn parse_page(sport: Sport, html: &str, page_url: &str) -> Vec<MatchSnapshot> {
    let Some(selectors) = RowSelectors::new() else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut league = String::new();
    let mut snapshots = Vec::new();

    for row in document.select(&selectors.rows) {
        if has_class(&row, "league-header") {
            league = clean_text(&row.text().collect::<String>());
            continue;
        }
        if !has_class(&row, "match-row") {
            continue;
        }

        let (Some(team1), Some(team2), Some(mut score)) = (
            cell_text(&row, &selectors.home),
            cell_text(&row, &selectors.away),
            cell_text(&row, &selectors.score),
        ) else {
            debug!(source = SOURCE_ID, "Skipping incomplete match row");
            continue;
        };

        if let Some(games) = cell_text(&row, &selectors.games) {
            let games = games.trim_matches(|c| c == '(' || c == ')');
            score = format!("{score} ({games})");
        }

        let odds = row
            .select(&selectors.odds)
            .filter_map(|cell| {
                let outcome = cell.value().attr("data-outcome")?.to_lowercase();
                let price = Decimal::from_str(clean_text(&cell.text().collect::<String>()).as_str()).ok()?;
                Some((outcome, price))
            })
            .collect();

        let url = row
            .value()
            .attr("data-href")
            .and_then(|href| base.as_ref()?.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| page_url.to_string());

        snapshots.push(MatchSnapshot {
            sport,
            team1,
            team2,
            score,
            minute: cell_text(&row, &selectors.minute).unwrap_or_default(),
            league: league.clone(),
            source: SOURCE_ID.to_string(),
            url,
            odds,
        });
    }

    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
        <table class="live-table">
          <tr class="league-header"><td colspan="5">England. Premier League</td></tr>
          <tr class="match-row" data-href="/match/101">
            <td class="minute">67'</td>
            <td class="home">Manchester City</td>
            <td class="score">2:1</td>
            <td class="away">Brighton</td>
            <td class="odds" data-outcome="1">1.22</td>
            <td class="odds" data-outcome="X">6.50</td>
          </tr>
          <tr class="match-row">
            <td class="minute">12'</td>
            <td class="home"></td>
            <td class="score">0:0</td>
            <td class="away">Broken FC</td>
          </tr>
          <tr class="league-header"><td>Spain. LaLiga</td></tr>
          <tr class="match-row">
            <td class="minute">45+2'</td>
            <td class="home">Getafe</td>
            <td class="score">0:1</td>
            <td class="away">Sevilla</td>
          </tr>
        </table>
        </body></html>"#;

    #[test]
    fn test_parse_page_rows_and_leagues() {
        let snapshots = parse_page(Sport::Football, PAGE, "https://scores.example/football/live");
        assert_eq!(snapshots.len(), 2);

        let first = &snapshots[0];
        assert_eq!(first.team1, "Manchester City");
        assert_eq!(first.team2, "Brighton");
        assert_eq!(first.score, "2:1");
        assert_eq!(first.minute, "67'");
        assert_eq!(first.league, "England. Premier League");
        assert_eq!(first.source, SOURCE_ID);
        assert_eq!(first.url, "https://scores.example/match/101");
        assert_eq!(first.odds.get("1"), Some(&dec!(1.22)));
        assert_eq!(first.odds.get("x"), Some(&dec!(6.50)));

        let second = &snapshots[1];
        assert_eq!(second.league, "Spain. LaLiga");
        assert_eq!(second.url, "https://scores.example/football/live");
    }

    #[test]
    fn test_parse_racket_games_cell() {
        let html = r#"<table class="live-table">
            <tr class="league-header"><td>ATP Vienna</td></tr>
            <tr class="match-row"><td class="minute">2nd set</td><td class="home">Sinner</td>
            <td class="score">1-0</td><td class="away">Ruud</td><td class="games">(4-2)</td></tr>
        </table>"#;
        let snapshots = parse_page(Sport::Tennis, html, "https://scores.example/tennis");
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].score, "1-0 (4-2)");
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_page(Sport::Football, "<div>maintenance</div>", "https://x").is_empty());
        assert!(parse_page(Sport::Football, "", "not a url").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_returns_empty_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/football"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut urls = BTreeMap::new();
        urls.insert(Sport::Football, format!("{}/football", server.uri()));
        let source = LiveTableSource::new(PageFetcher::new("test-agent", Duration::from_secs(5)), urls);

        assert!(source.fetch(Sport::Football).await.is_empty());
        assert!(source.fetch(Sport::Handball).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_parses_live_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/football"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let mut urls = BTreeMap::new();
        urls.insert(Sport::Football, format!("{}/football", server.uri()));
        let source = LiveTableSource::new(PageFetcher::new("test-agent", Duration::from_secs(5)), urls);

        let snapshots = source.fetch(Sport::Football).await;
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.source == "livetable"));
    }
}
