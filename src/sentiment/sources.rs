//! Text feeds scored by the sentiment service
//!
//! Every source answers the same question: which posts or articles about
//! this company were published since `since`. Sources that are not
//! configured are never constructed, see `SentimentService::from_config`.

use crate::config::BROWSER_USER_AGENT;
use crate::core::error::{AppError, AppResult, UpstreamError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Twitter,
    News,
    Moneycontrol,
    EconomicTimes,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Twitter => "twitter",
            SourceKind::News => "news",
            SourceKind::Moneycontrol => "moneycontrol",
            SourceKind::EconomicTimes => "economic_times",
        }
    }
}

/// One post or article before scoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawItem {
    pub source: SourceKind,
    pub text: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait SentimentSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(
        &self,
        symbol: &str,
        company_name: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<RawItem>>;
}

fn http_client(timeout_secs: u64) -> AppResult<Client> {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Config(format!("cannot build HTTP client: {}", e)))
}

/// Exchange suffixes removed: `RELIANCE.NS` -> `RELIANCE`; numeric BSE
/// codes are not searchable and yield `None`
pub fn search_symbol(symbol: &str) -> Option<String> {
    let base = symbol
        .trim()
        .trim_end_matches(".NS")
        .trim_end_matches(".BO")
        .to_uppercase();
    let searchable = !base.is_empty()
        && base.chars().all(|c| c.is_ascii_alphanumeric())
        && base.chars().any(|c| c.is_ascii_alphabetic());
    searchable.then_some(base)
}

/// Company name without a trailing `Ltd`/`Limited`
pub fn search_name(company_name: &str) -> String {
    let name = company_name.trim();
    for suffix in [" Limited", " Ltd.", " Ltd"] {
        let Some(cut) = name.len().checked_sub(suffix.len()) else {
            continue;
        };
        if let (Some(head), Some(tail)) = (name.get(..cut), name.get(cut..)) {
            if tail.eq_ignore_ascii_case(suffix) {
                return head.trim().to_string();
            }
        }
    }
    name.to_string()
}

async fn checked(
    service: &'static str,
    result: Result<reqwest::Response, reqwest::Error>,
) -> AppResult<reqwest::Response> {
    let response = result.map_err(|e| UpstreamError::transport(service, e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::from_status(service, status.as_u16(), body).into());
    }
    Ok(response)
}

// Twitter / X API v2

pub struct TwitterSource {
    client: Client,
    api_base: String,
    bearer_token: String,
}

#[derive(Deserialize)]
struct TweetSearch {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
}

impl TwitterSource {
    const SERVICE: &'static str = "twitter";
    const MAX_RESULTS: &'static str = "50";

    pub fn new(api_base: &str, bearer_token: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            client: http_client(15)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        })
    }

    pub fn query(symbol: &str, company_name: &str) -> String {
        let name = search_name(company_name);
        match search_symbol(symbol) {
            Some(sym) => format!("(\"{}\" OR #{}) lang:en -is:retweet", name, sym),
            None => format!("\"{}\" lang:en -is:retweet", name),
        }
    }
}

/// Recent search rejects a `start_time` older than seven days at arrival
fn recent_search_start(since: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let earliest = now - ChronoDuration::days(7) + ChronoDuration::minutes(1);
    since.max(earliest)
}

#[async_trait]
impl SentimentSource for TwitterSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Twitter
    }

    async fn fetch(
        &self,
        symbol: &str,
        company_name: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<RawItem>> {
        let url = format!("{}/2/tweets/search/recent", self.api_base);
        let start_time =
            recent_search_start(since, Utc::now()).to_rfc3339_opts(SecondsFormat::Secs, true);
        let query = Self::query(symbol, company_name);

        let response = checked(
            Self::SERVICE,
            self.client
                .get(url)
                .bearer_auth(&self.bearer_token)
                .query(&[
                    ("query", query.as_str()),
                    ("start_time", start_time.as_str()),
                    ("max_results", Self::MAX_RESULTS),
                    ("tweet.fields", "created_at"),
                ])
                .send()
                .await,
        )
        .await?;

        let search: TweetSearch = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid_payload(Self::SERVICE, e))?;

        Ok(search
            .data
            .into_iter()
            .map(|tweet| RawItem {
                source: SourceKind::Twitter,
                url: Some(format!("https://x.com/i/web/status/{}", tweet.id)),
                text: tweet.text,
                published_at: tweet.created_at.unwrap_or_else(Utc::now),
            })
            .filter(|item| item.published_at >= since)
            .collect())
    }
}

// NewsAPI.org

pub struct NewsApiSource {
    client: Client,
    api_base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct NewsEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

impl NewsApiSource {
    const SERVICE: &'static str = "newsapi";

    pub fn new(api_base: &str, api_key: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            client: http_client(15)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SentimentSource for NewsApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    async fn fetch(
        &self,
        _symbol: &str,
        company_name: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<RawItem>> {
        let url = format!("{}/v2/everything", self.api_base);
        let query = format!("\"{}\"", search_name(company_name));
        let from = since.to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = checked(
            Self::SERVICE,
            self.client
                .get(url)
                .header("X-Api-Key", &self.api_key)
                .query(&[
                    ("q", query.as_str()),
                    ("from", from.as_str()),
                    ("language", "en"),
                    ("sortBy", "publishedAt"),
                    ("pageSize", "50"),
                ])
                .send()
                .await,
        )
        .await?;

        let envelope: NewsEnvelope = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid_payload(Self::SERVICE, e))?;
        if envelope.status != "ok" {
            return Err(UpstreamError::Api {
                service: Self::SERVICE,
                message: envelope.message.unwrap_or(envelope.status),
            }
            .into());
        }

        Ok(envelope
            .articles
            .into_iter()
            .filter_map(|article| {
                let text = join_text(article.title.as_deref(), article.description.as_deref())?;
                Some(RawItem {
                    source: SourceKind::News,
                    text,
                    url: article.url,
                    published_at: article.published_at?,
                })
            })
            .filter(|item| item.published_at >= since)
            .collect())
    }
}

fn join_text(title: Option<&str>, description: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [title, description]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(". "))
}

// Moneycontrol / Economic Times RSS

pub struct RssNewsSource {
    kind: SourceKind,
    client: Client,
    feed_url: String,
}

#[derive(Debug, Clone, PartialEq)]
struct FeedItem {
    title: String,
    description: String,
    link: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

impl RssNewsSource {
    pub fn new(kind: SourceKind, feed_url: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            kind,
            client: http_client(15)?,
            feed_url: feed_url.into(),
        })
    }

    pub fn moneycontrol(feed_url: impl Into<String>) -> AppResult<Self> {
        Self::new(SourceKind::Moneycontrol, feed_url)
    }

    pub fn economic_times(feed_url: impl Into<String>) -> AppResult<Self> {
        Self::new(SourceKind::EconomicTimes, feed_url)
    }
}

fn parse_feed(xml: &str) -> Vec<FeedItem> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    let item_re = ITEM.get_or_init(|| Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").unwrap());

    item_re
        .captures_iter(xml)
        .filter_map(|caps| {
            let body = caps.get(1)?.as_str();
            let title = tag_text(body, "title").unwrap_or_default();
            let description = tag_text(body, "description").unwrap_or_default();
            if title.is_empty() && description.is_empty() {
                return None;
            }
            Some(FeedItem {
                title,
                description,
                link: tag_text(body, "link").filter(|l| !l.is_empty()),
                published_at: tag_text(body, "pubDate").and_then(|d| {
                    DateTime::parse_from_rfc2822(&d)
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                }),
            })
        })
        .collect()
}

/// Inner text of the first `<tag>`, with CDATA unwrapped and markup removed
fn tag_text(body: &str, tag: &str) -> Option<String> {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    let markup = MARKUP.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());

    // `<tag>` or `<tag attr..>`, never `<tagname>`
    let open = format!("<{}", tag);
    let mut from = 0;
    let start = loop {
        let at = from + body[from..].find(&open)?;
        let next = body[at + open.len()..].chars().next()?;
        if next == '>' || next.is_whitespace() {
            break at;
        }
        from = at + open.len();
    };
    let after_open = start + body[start..].find('>')? + 1;
    let close = format!("</{}>", tag);
    let end = after_open + body[after_open..].find(&close)?;

    let raw = body[after_open..end].trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|r| r.strip_suffix("]]>"))
        .unwrap_or(raw);
    let text = markup.replace_all(raw, " ");
    Some(
        text.replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn mentions(text: &str, name: &str, symbol: Option<&str>) -> bool {
    let haystack = text.to_lowercase();
    if !name.is_empty() && haystack.contains(&name.to_lowercase()) {
        return true;
    }
    match symbol {
        Some(sym) => haystack
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word.eq_ignore_ascii_case(sym)),
        None => false,
    }
}

#[async_trait]
impl SentimentSource for RssNewsSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(
        &self,
        symbol: &str,
        company_name: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<RawItem>> {
        let service = self.kind.name();
        let response = checked(service, self.client.get(&self.feed_url).send().await).await?;
        let xml = response
            .text()
            .await
            .map_err(|e| UpstreamError::invalid_payload(service, e))?;

        let name = search_name(company_name);
        let symbol = search_symbol(symbol);

        Ok(parse_feed(&xml)
            .into_iter()
            .filter_map(|item| {
                let published_at = item.published_at.filter(|at| *at >= since)?;
                let text = join_text(Some(item.title.as_str()), Some(item.description.as_str()))?;
                mentions(&text, &name, symbol.as_deref()).then(|| RawItem {
                    source: self.kind,
                    text,
                    url: item.link,
                    published_at,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const FEED: &str = r#"<?xml version="1.0"?>
<rss><channel><title>Business</title>
<item>
  <title><![CDATA[Reliance shares surge after strong results]]></title>
  <link>https://example.com/a</link>
  <description><![CDATA[<p>Profit beats estimates</p>]]></description>
  <pubDate>Wed, 13 Mar 2024 10:00:00 +0530</pubDate>
</item>
<item>
  <title>TCS &amp; Infosys slip</title>
  <description>IT stocks decline</description>
  <pubDate>Wed, 13 Mar 2024 11:00:00 +0530</pubDate>
</item>
<item>
  <title>RELIANCE hits record high</title>
  <pubDate>Mon, 01 Jan 2024 09:00:00 +0530</pubDate>
</item>
</channel></rss>"#;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[test]
    fn test_search_terms() {
        assert_eq!(search_symbol("reliance.NS"), Some("RELIANCE".to_string()));
        assert_eq!(search_symbol("500325"), None);
        assert_eq!(search_name("Reliance Industries Ltd"), "Reliance Industries");
        assert_eq!(search_name("Infosys Limited"), "Infosys");
        assert_eq!(
            TwitterSource::query("500325", "Infosys Ltd."),
            "\"Infosys\" lang:en -is:retweet"
        );
    }

    #[test]
    fn test_parse_feed() {
        let items = parse_feed(FEED);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Reliance shares surge after strong results");
        assert_eq!(items[0].description, "Profit beats estimates");
        assert_eq!(items[0].link.as_deref(), Some("https://example.com/a"));
        assert_eq!(
            items[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 13, 4, 30, 0).unwrap())
        );
        assert_eq!(items[1].title, "TCS & Infosys slip");
        assert_eq!(items[2].link, None);
    }

    #[test]
    fn test_tag_text_matches_exact_tag_and_decodes_once() {
        let body = "<titles>wrong</titles><title lang=\"en\">A &amp;lt; B &amp; C</title>";
        assert_eq!(tag_text(body, "title").as_deref(), Some("A &lt; B & C"));
        assert_eq!(tag_text("<pubDateX>1</pubDateX>", "pubDate"), None);
    }

    #[test]
    fn test_recent_search_start_stays_inside_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
        let week = now - ChronoDuration::hours(168);
        assert_eq!(
            recent_search_start(week, now),
            Utc.with_ymd_and_hms(2024, 3, 6, 12, 1, 0).unwrap()
        );
        let hour = now - ChronoDuration::hours(1);
        assert_eq!(recent_search_start(hour, now), hour);
    }

    #[tokio::test]
    async fn test_twitter_start_time_at_full_week() {
        let sent: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let captured = sent.clone();
        let app = Router::new().route(
            "/2/tweets/search/recent",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = q.get("start_time").cloned();
                    Json(json!({ "meta": { "result_count": 0 } }))
                }
            }),
        );
        let base = serve(app).await;
        let before = Utc::now();

        let source = TwitterSource::new(&base, "t").unwrap();
        let items = source
            .fetch("RELIANCE", "Reliance", before - ChronoDuration::hours(168))
            .await
            .unwrap();
        assert!(items.is_empty());

        let start_time = sent.lock().unwrap().clone().expect("start_time sent");
        let start = DateTime::parse_from_rfc3339(&start_time).unwrap().with_timezone(&Utc);
        // whole seconds only, so allow one second of truncation
        assert!(start >= before - ChronoDuration::days(7) + ChronoDuration::seconds(59));
    }

    #[tokio::test]
    async fn test_rss_filters_by_company_and_date() {
        let base = serve(Router::new().route("/feed.xml", get(|| async { FEED }))).await;
        let source = RssNewsSource::moneycontrol(format!("{}/feed.xml", base)).unwrap();
        let since = Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap();

        let items = source
            .fetch("500325", "Reliance Industries Ltd", since)
            .await
            .unwrap();
        assert!(items.is_empty());

        // the record-high item names the symbol but is too old
        let items = source.fetch("RELIANCE.NS", "Reliance", since).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, SourceKind::Moneycontrol);
        assert!(items[0].text.starts_with("Reliance shares surge"));
    }

    #[tokio::test]
    async fn test_twitter_sends_bearer_and_maps_tweets() {
        let app = Router::new().route(
            "/2/tweets/search/recent",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer token-1" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({ "title": "Unauthorized" })));
                }
                let now = Utc::now().to_rfc3339();
                (
                    StatusCode::OK,
                    Json(json!({
                        "data": [{ "id": "1", "text": "Reliance rally continues", "created_at": now }],
                        "meta": { "result_count": 1 }
                    })),
                )
            }),
        );
        let base = serve(app).await;
        let since = Utc::now() - ChronoDuration::hours(1);

        let source = TwitterSource::new(&base, "token-1").unwrap();
        let items = source.fetch("RELIANCE", "Reliance", since).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url.as_deref(), Some("https://x.com/i/web/status/1"));

        let wrong = TwitterSource::new(&base, "nope").unwrap();
        let err = wrong.fetch("RELIANCE", "Reliance", since).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Upstream(UpstreamError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_twitter_rate_limit_is_typed() {
        let app = Router::new().route(
            "/2/tweets/search/recent",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(app).await;
        let source = TwitterSource::new(&base, "t").unwrap();
        let err = source
            .fetch("RELIANCE", "Reliance", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Upstream(UpstreamError::RateLimited { service: "twitter" })
        ));
    }

    #[tokio::test]
    async fn test_news_api_error_status() {
        let app = Router::new().route(
            "/v2/everything",
            get(|| async {
                Json(json!({ "status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid" }))
            }),
        );
        let base = serve(app).await;
        let source = NewsApiSource::new(&base, "bad").unwrap();
        let err = source.fetch("X", "Reliance", Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Upstream(UpstreamError::Api { service: "newsapi", .. })
        ));
    }
}
