//! Page fetching shared by the HTML sources.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

/// GET-only client with a browser-like identity.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.7,ru;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }

    /// Fetch a page body; non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed for {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} from {url}");
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {url}"))
    }
}

/// Collapse runs of whitespace in scraped text.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Manchester\n   City "), "Manchester City");
        assert_eq!(clean_text(""), "");
    }

    #[tokio::test]
    async fn test_get_text_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new("Mozilla/5.0 test", Duration::from_secs(5));
        let body = fetcher.get_text(&format!("{}/live", server.uri())).await.unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn test_get_text_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new("Mozilla/5.0 test", Duration::from_secs(5));
        let err = fetcher.get_text(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
