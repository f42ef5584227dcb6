//! BSE corporate announcements (`AnnGetData`) and attachment downloads

use crate::clock::{ist, ist_now};
use crate::config::{BROWSER_USER_AGENT, Endpoints};
use crate::core::error::{AppError, AppResult, UpstreamError};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "bse";

/// Days of history each announcement query covers
pub const LOOKBACK_DAYS: i64 = 7;

/// Announcement categories a user can subscribe to
pub const CATEGORIES: [&str; 8] = [
    "Board Meeting",
    "Result",
    "AGM/EGM",
    "Company Update",
    "Corp. Action",
    "Insider Trading / SAST",
    "New Listing",
    "Others",
];

pub const DEFAULT_CATEGORY: &str = "Others";

/// Whether `category` passes the user's preferences; no preferences means all
pub fn category_allowed(prefs: &[String], category: &str) -> bool {
    prefs.is_empty() || prefs.iter().any(|p| p.eq_ignore_ascii_case(category))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    pub news_id: String,
    pub scrip_code: String,
    pub headline: String,
    pub pdf_name: String,
    pub category: String,
    pub ann_dt: DateTime<FixedOffset>,
}

const DATE_FORMATS: [&str; 4] = [
    "%d %b %Y %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse the date formats BSE has been seen to emit; naive values are IST
pub fn parse_announcement_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let localize = |naive: NaiveDateTime| ist().from_local_datetime(&naive).single();

    for format in DATE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return localize(naive);
        }
    }

    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return Some(aware.with_timezone(&ist()));
    }

    // ISO fallback after dropping fractional seconds
    let trimmed = raw.split('.').next().unwrap_or(raw);
    if let Ok(aware) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(aware.with_timezone(&ist()));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return localize(naive);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(localize)
}

fn text_field(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn one `Table` row into an announcement; rows without id, attachment
/// or a parseable date are dropped
fn parse_row(row: &Value, scrip_code: &str) -> Option<Announcement> {
    let news_id = text_field(row, "NEWSID")?;
    let pdf_name = text_field(row, "ATTACHMENTNAME")?;
    let raw_date = text_field(row, "NEWS_DT").or_else(|| text_field(row, "DissemDT"))?;
    let ann_dt = parse_announcement_date(&raw_date)?;

    Some(Announcement {
        news_id,
        scrip_code: scrip_code.to_string(),
        headline: text_field(row, "NEWSSUB")
            .or_else(|| text_field(row, "HEADLINE"))
            .unwrap_or_else(|| "N/A".to_string()),
        pdf_name,
        category: text_field(row, "CATEGORYNAME").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        ann_dt,
    })
}

#[derive(Clone)]
pub struct BseClient {
    client: Client,
    announcements_url: String,
    attachments_url: String,
}

impl BseClient {
    pub fn new(endpoints: &Endpoints) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let referer = HeaderValue::from_str(&endpoints.bse_referer)
            .map_err(|e| AppError::Config(format!("invalid BSE referer: {}", e)))?;
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("cannot build BSE client: {}", e)))?;

        Ok(Self {
            client,
            announcements_url: endpoints.bse_announcements.clone(),
            attachments_url: endpoints.bse_attachments.clone(),
        })
    }

    /// Announcements for one scrip published at or after `since`
    ///
    /// Queries the last seven IST days. Any failure yields an empty list.
    pub async fn fetch_announcements(
        &self,
        scrip_code: &str,
        since: DateTime<FixedOffset>,
    ) -> Vec<Announcement> {
        match self.query(scrip_code).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| parse_row(row, scrip_code))
                .filter(|a| a.ann_dt >= since)
                .collect(),
            Err(e) => {
                tracing::warn!(scrip_code = %scrip_code, error = %e, "BSE announcement fetch failed");
                Vec::new()
            }
        }
    }

    async fn query(&self, scrip_code: &str) -> AppResult<Vec<Value>> {
        let today = ist_now();
        let from = today - ChronoDuration::days(LOOKBACK_DAYS);
        let params = [
            ("strCat", "-1".to_string()),
            ("strPrevDate", from.format("%Y%m%d").to_string()),
            ("strToDate", today.format("%Y%m%d").to_string()),
            ("strScrip", scrip_code.to_string()),
            ("strSearch", "P".to_string()),
            ("strType", "C".to_string()),
        ];

        let response = self
            .client
            .get(&self.announcements_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(SERVICE, status.as_u16(), body).into());
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid_payload(SERVICE, e))?;
        Ok(data
            .get("Table")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Download an attachment; `None` when BSE does not serve it
    pub async fn fetch_pdf(&self, pdf_name: &str) -> AppResult<Option<Vec<u8>>> {
        let url = format!("{}{}", self.attachments_url, pdf_name);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            tracing::debug!(pdf_name = %pdf_name, status = %response.status(), "attachment unavailable");
            return Ok(None);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok((!bytes.is_empty()).then(|| bytes.to_vec()))
    }
}
