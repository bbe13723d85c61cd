//! Outbound channel for digests and lifecycle messages.
//!
//! Publishing is best-effort: failures are logged and reported as `false`,
//! never raised to the cycle.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{PublisherConfig, Secrets};
use crate::digest::formatter::{escape_html, format_no_matches, header_time};
use crate::model::clock::now_local;

/// A bot-style messaging endpoint.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Post one message (already sanitized and within the length limit).
    async fn post(&self, text: &str) -> Result<()>;

    /// Identity of the bot behind the channel.
    async fn identity(&self) -> Result<String>;
}

pub struct TelegramChannel {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
    first_name: String,
}

impl TelegramChannel {
    pub fn new(api_base: &str, token: SecretString, chat_id: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn post(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        // The URL embeds the token, so reqwest errors are reported without it.
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("sendMessage request failed: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("sendMessage returned {status}: {body}");
        }
        Ok(())
    }

    async fn identity(&self) -> Result<String> {
        let response = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("getMe request failed: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            bail!("getMe returned {status}");
        }

        let payload: TelegramResponse<BotUser> =
            response.json().await.context("Failed to parse getMe response")?;
        match (payload.ok, payload.result) {
            (true, Some(user)) => Ok(user.username.unwrap_or(user.first_name)),
            _ => bail!(
                "getMe rejected: {}",
                payload.description.unwrap_or_else(|| "no description".to_string())
            ),
        }
    }
}

/// Sends digests and lifecycle messages to the configured channel.
pub struct Publisher {
    channel: Option<Box<dyn Channel>>,
    max_message_len: usize,
}

impl Publisher {
    pub fn new(channel: Option<Box<dyn Channel>>, max_message_len: usize) -> Self {
        Self {
            channel,
            max_message_len: max_message_len.max(1),
        }
    }

    /// A publisher without a channel; every send reports `false`.
    pub fn disabled() -> Self {
        Self::new(None, 4096)
    }

    pub fn from_config(config: &PublisherConfig, secrets: &Secrets) -> Self {
        match (&secrets.telegram_bot_token, &secrets.telegram_channel) {
            (Some(token), Some(channel)) => {
                let telegram = TelegramChannel::new(
                    &config.api_base_url,
                    token.clone(),
                    channel.clone(),
                    Duration::from_secs(config.timeout_seconds),
                );
                Self::new(Some(Box::new(telegram)), config.max_message_len)
            }
            _ => {
                warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHANNEL not set — publishing disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    /// Post a digest as exactly one message. A digest over the limit is not
    /// posted at all, so the channel never shows half of one.
    pub async fn send_digest(&self, text: &str) -> bool {
        let Some(channel) = &self.channel else {
            debug!("Publishing disabled — digest dropped");
            return false;
        };

        let sanitized = sanitize_markup(text);
        let chars = sanitized.chars().count();
        if chars > self.max_message_len {
            error!(chars, limit = self.max_message_len, "Digest exceeds message limit — not published");
            return false;
        }

        match channel.post(&sanitized).await {
            Ok(()) => {
                debug!(chars, "Digest published");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to publish digest");
                false
            }
        }
    }

    /// Sanitize, split at the length limit and post in order. Used for
    /// lifecycle and stats messages; digests go through [`Self::send_digest`].
    pub async fn send(&self, text: &str) -> bool {
        let Some(channel) = &self.channel else {
            debug!("Publishing disabled — message dropped");
            return false;
        };

        let sanitized = sanitize_markup(text);
        let chunks = split_message(&sanitized, self.max_message_len);
        let parts = chunks.len();

        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(e) = channel.post(chunk).await {
                warn!(part = index + 1, parts, error = %e, "Failed to publish message");
                return false;
            }
        }

        debug!(parts, chars = sanitized.chars().count(), "Message published");
        true
    }

    pub async fn send_startup(&self) -> bool {
        let text = format!(
            "🚀 <b>Live picks started</b>\n{}\nScanning football, tennis, table tennis and handball.",
            header_time(now_local())
        );
        self.send(&text).await
    }

    pub async fn send_shutdown(&self) -> bool {
        let text = format!("🛑 <b>Live picks stopped</b>\n{}", header_time(now_local()));
        self.send(&text).await
    }

    pub async fn send_no_matches(&self, at: DateTime<FixedOffset>) -> bool {
        self.send(&format_no_matches(at)).await
    }

    pub async fn send_error(&self, message: &str) -> bool {
        let text = format!("❗ <b>Cycle error</b>\n{}", escape_html(message));
        self.send(&text).await
    }

    pub async fn send_daily_stats(&self, text: &str) -> bool {
        self.send(text).await
    }

    /// Query the bot identity and log it.
    pub async fn health_check(&self) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        match channel.identity().await {
            Ok(name) => {
                info!(bot = %name, "Channel health check passed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Channel health check failed");
                false
            }
        }
    }
}

/// Keep `<b>` and `<i>` (mapping `<strong>`/`<em>`), turn `<br>` into a
/// newline, drop every other tag and escape stray `<`.
pub fn sanitize_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];

        let Some(close) = after.find('>') else {
            out.push_str("&lt;");
            rest = &after[1..];
            continue;
        };

        match classify_tag(&after[1..close]) {
            Some(Tag::Keep(rendered)) => out.push_str(&rendered),
            Some(Tag::LineBreak) => out.push('\n'),
            Some(Tag::Drop) => {}
            None => {
                out.push_str("&lt;");
                rest = &after[1..];
                continue;
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

enum Tag {
    Keep(String),
    LineBreak,
    Drop,
}

fn classify_tag(inner: &str) -> Option<Tag> {
    let (closing, body) = match inner.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, inner),
    };
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    let slash = if closing { "/" } else { "" };
    Some(match name.as_str() {
        "b" | "strong" => Tag::Keep(format!("<{slash}b>")),
        "i" | "em" => Tag::Keep(format!("<{slash}i>")),
        "br" => Tag::LineBreak,
        _ => Tag::Drop,
    })
}

/// Room kept free in a hard-cut piece for re-opened and closed `<b><i>` tags.
const MARKUP_RESERVE: usize = 14;

const BALANCED_TAGS: [&str; 2] = ["b", "i"];

/// Split at line boundaries so that every chunk has at most `max_chars`
/// characters. Single lines longer than the limit are cut hard, never inside
/// a tag or an entity, with `<b>`/`<i>` closed and re-opened around the cut.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { current_len + 1 + line_len };

        if needed <= max_chars {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= max_chars {
            current.push_str(line);
            current_len = line_len;
        } else {
            chunks.extend(cut_long_line(line, max_chars));
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn cut_long_line(line: &str, max_chars: usize) -> Vec<String> {
    let has_markup = line.contains('<') || line.contains('&');
    let budget = if has_markup {
        max_chars.saturating_sub(MARKUP_RESERVE).max(1)
    } else {
        max_chars
    };

    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + budget).min(chars.len());
        if end < chars.len() {
            if let Some(offset) = chars[start..end].iter().rposition(|c| matches!(c, '<' | '&')) {
                let open = start + offset;
                let closer = if chars[open] == '<' { '>' } else { ';' };
                if open > start && !chars[open..end].contains(&closer) {
                    end = open;
                }
            }
        }
        pieces.push(chars[start..end].iter().collect::<String>());
        start = end;
    }

    if has_markup {
        balance_tags(pieces)
    } else {
        pieces
    }
}

/// Close tags still open at the end of each piece and re-open them at the
/// start of the next.
fn balance_tags(pieces: Vec<String>) -> Vec<String> {
    let mut open: Vec<&str> = Vec::new();
    pieces
        .into_iter()
        .map(|piece| {
            let mut balanced: String = open.iter().map(|tag| format!("<{tag}>")).collect();

            let mut rest = piece.as_str();
            while let Some(at) = rest.find('<') {
                let after = &rest[at..];
                for tag in BALANCED_TAGS {
                    if after.starts_with(&format!("<{tag}>")) {
                        open.push(tag);
                    } else if after.starts_with(&format!("</{tag}>")) {
                        if let Some(pos) = open.iter().rposition(|t| *t == tag) {
                            open.remove(pos);
                        }
                    }
                }
                rest = &after[1..];
            }

            balanced.push_str(&piece);
            balanced.extend(open.iter().rev().map(|tag| format!("</{tag}>")));
            balanced
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingChannel {
        posts: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        async fn post(&self, text: &str) -> Result<()> {
            if self.fail {
                bail!("channel down");
            }
            self.posts.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn identity(&self) -> Result<String> {
            Ok("recorder".into())
        }
    }

    fn recording(max: usize, fail: bool) -> (Publisher, Arc<Mutex<Vec<String>>>) {
        let posts = Arc::new(Mutex::new(Vec::new()));
        let channel = RecordingChannel { posts: posts.clone(), fail };
        (Publisher::new(Some(Box::new(channel)), max), posts)
    }

    #[test]
    fn test_sanitize_markup() {
        assert_eq!(sanitize_markup("<b>bold</b> and <i>it</i>"), "<b>bold</b> and <i>it</i>");
        assert_eq!(sanitize_markup("<strong>x</strong><em>y</em>"), "<b>x</b><i>y</i>");
        assert_eq!(sanitize_markup("a<br>b<br/>c"), "a\nb\nc");
        assert_eq!(sanitize_markup("<div class=\"x\">text</div>"), "text");
        assert_eq!(sanitize_markup("<a href=\"u\">link</a>"), "link");
        assert_eq!(sanitize_markup("1 < 2"), "1 &lt; 2");
        assert_eq!(sanitize_markup("<0.75 bucket>"), "&lt;0.75 bucket>");
        assert_eq!(sanitize_markup("&lt;U21&gt;"), "&lt;U21&gt;");
    }

    #[test]
    fn test_split_message_at_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 100), vec![text.to_string()]);
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb".to_string(), "cccc".to_string()]);
        assert_eq!(split_message("abcdefgh", 3), vec!["abc", "def", "gh"]);

        let long: String = (0..500).map(|i| format!("line {i}\n")).collect();
        for chunk in split_message(&long, 4096 / 4) {
            assert!(chunk.chars().count() <= 1024);
        }
    }

    fn strip_tags(text: &str) -> String {
        text.replace("<b>", "").replace("</b>", "").replace("<i>", "").replace("</i>", "")
    }

    #[test]
    fn test_hard_cut_keeps_markup_valid() {
        let line = format!("<b>{}</b> &amp; <i>{}</i>", "x".repeat(37), "y".repeat(23));
        let chunks = split_message(&line, 20);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "too long: {chunk}");
            assert_eq!(chunk.matches("<b>").count(), chunk.matches("</b>").count(), "{chunk}");
            assert_eq!(chunk.matches("<i>").count(), chunk.matches("</i>").count(), "{chunk}");
            assert!(!chunk.ends_with('<') && !chunk.ends_with("&am"), "{chunk}");
            assert_eq!(chunk.matches('<').count(), chunk.matches('>').count(), "{chunk}");
        }
        assert_eq!(strip_tags(&chunks.concat()), strip_tags(&line));
    }

    /// Accepts the first `ok_posts` posts, then fails.
    struct FlakyChannel {
        posts: Arc<Mutex<Vec<String>>>,
        ok_posts: usize,
    }

    #[async_trait]
    impl Channel for FlakyChannel {
        async fn post(&self, text: &str) -> Result<()> {
            let mut posts = self.posts.lock().unwrap();
            if posts.len() >= self.ok_posts {
                bail!("rate limited");
            }
            posts.push(text.to_string());
            Ok(())
        }

        async fn identity(&self) -> Result<String> {
            Ok("flaky".into())
        }
    }

    #[tokio::test]
    async fn test_digest_is_all_or_nothing() {
        let posts = Arc::new(Mutex::new(Vec::new()));
        let channel = FlakyChannel { posts: posts.clone(), ok_posts: 1 };
        let publisher = Publisher::new(Some(Box::new(channel)), 20);

        assert!(!publisher.send_digest("first line of digest\nsecond line of digest").await);
        assert!(posts.lock().unwrap().is_empty());

        assert!(publisher.send_digest("short <b>digest</b>").await);
        assert_eq!(posts.lock().unwrap().as_slice(), ["short <b>digest</b>"]);

        assert!(!publisher.send_digest("another one").await);
        assert_eq!(posts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_publisher_returns_false() {
        let publisher = Publisher::disabled();
        assert!(!publisher.is_enabled());
        assert!(!publisher.send("hello").await);
        assert!(!publisher.health_check().await);
    }

    #[tokio::test]
    async fn test_send_splits_and_sanitizes() {
        let (publisher, posts) = recording(10, false);
        assert!(publisher.send("<div>12345</div>\n<strong>6789</strong>").await);
        let posts = posts.lock().unwrap();
        assert_eq!(posts.as_slice(), ["12345", "<b>6789</b>"]);
    }

    #[tokio::test]
    async fn test_channel_failure_is_false() {
        let (publisher, _) = recording(4096, true);
        assert!(!publisher.send_error("boom <here>").await);
    }

    #[tokio::test]
    async fn test_telegram_channel_posts_html() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({"chat_id": "@picks", "parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = TelegramChannel::new(&server.uri(), SecretString::from("123:abc"), "@picks".into(), Duration::from_secs(5));
        let publisher = Publisher::new(Some(Box::new(channel)), 4096);
        assert!(publisher.send("<b>hi</b>").await);
    }

    #[tokio::test]
    async fn test_telegram_error_status_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"ok\":false}"))
            .mount(&server)
            .await;

        let channel = TelegramChannel::new(&server.uri(), SecretString::from("t"), "@picks".into(), Duration::from_secs(5));
        let publisher = Publisher::new(Some(Box::new(channel)), 4096);
        assert!(!publisher.send("hi").await);
    }

    #[tokio::test]
    async fn test_health_check_reads_username() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bott/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "Picks", "username": "live_picks_bot"}
            })))
            .mount(&server)
            .await;

        let channel = TelegramChannel::new(&server.uri(), SecretString::from("t"), "@picks".into(), Duration::from_secs(5));
        assert_eq!(channel.identity().await.unwrap(), "live_picks_bot");
        assert!(Publisher::new(Some(Box::new(channel)), 4096).health_check().await);
    }
}
