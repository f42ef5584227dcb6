//! Yahoo Finance chart API with a TTL cache, plus the price metrics built
//! on top of it (last price, moving averages, hourly spikes)

use crate::config::BROWSER_USER_AGENT;
use crate::core::error::{AppError, AppResult};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// One close in a chart series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub at: DateTime<Utc>,
    pub close: f64,
}

pub type Series = Arc<Vec<PricePoint>>;

type CacheKey = (String, String, String);

#[derive(Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Deserialize, Default)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Deserialize, Default)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Pair timestamps with closes, dropping null closes
fn to_series(result: ChartResult) -> Vec<PricePoint> {
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let close = close.filter(|c| c.is_finite())?;
            let at = Utc.timestamp_opt(*ts, 0).single()?;
            Some(PricePoint { at, close })
        })
        .collect()
}

/// Percentage move over the last hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyMove {
    pub latest: f64,
    pub reference: f64,
    pub change_pct: f64,
}

impl HourlyMove {
    pub fn is_spike(&self, threshold_pct: f64) -> bool {
        self.change_pct.abs() >= threshold_pct
    }
}

/// Compare the latest close with the last close at least 60 minutes older
pub fn hourly_move(series: &[PricePoint]) -> Option<HourlyMove> {
    let latest = series.last()?;
    let cutoff = latest.at - ChronoDuration::minutes(60);
    let reference = series.iter().rev().find(|p| p.at <= cutoff)?;
    if reference.close == 0.0 {
        return None;
    }

    Some(HourlyMove {
        latest: latest.close,
        reference: reference.close,
        change_pct: (latest.close - reference.close) / reference.close * 100.0,
    })
}

/// Mean of the last `window` closes, if the series is long enough
pub fn trailing_mean(series: &[PricePoint], window: usize) -> Option<f64> {
    if window == 0 || series.len() < window {
        return None;
    }
    let tail = &series[series.len() - window..];
    Some(tail.iter().map(|p| p.close).sum::<f64>() / window as f64)
}

/// `₹1234.50`, or `N/A` when the value is missing
pub fn format_inr(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("₹{:.2}", v),
        _ => "N/A".to_string(),
    }
}

#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    chart_base: String,
    ttl: Duration,
    cache: Arc<RwLock<HashMap<CacheKey, (Instant, Series)>>>,
}

impl YahooClient {
    pub fn new(chart_base: impl Into<String>, ttl: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("cannot build Yahoo client: {}", e)))?;

        Ok(Self {
            client,
            chart_base: chart_base.into().trim_end_matches('/').to_string(),
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn cached(&self, key: &CacheKey) -> Option<Series> {
        let cache = self.cache.read().ok()?;
        let (stored_at, series) = cache.get(key)?;
        (stored_at.elapsed() < self.ttl).then(|| series.clone())
    }

    fn store(&self, key: CacheKey, series: Series) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, (Instant::now(), series));
        }
    }

    /// Closes for `symbol`; `None` on HTTP errors, malformed or empty data
    pub async fn chart_series(&self, symbol: &str, range: &str, interval: &str) -> Option<Series> {
        let key = (symbol.to_string(), range.to_string(), interval.to_string());
        if let Some(series) = self.cached(&key) {
            return Some(series);
        }

        let url = format!("{}/{}", self.chart_base, symbol);
        let response = self
            .client
            .get(url)
            .query(&[("range", range), ("interval", interval)])
            .send()
            .await
            .map_err(|e| tracing::debug!(symbol = %symbol, error = %e, "chart request failed"))
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!(symbol = %symbol, status = %response.status(), range, interval, "chart API error");
            return None;
        }

        let envelope: ChartEnvelope = response
            .json()
            .await
            .map_err(|e| tracing::debug!(symbol = %symbol, error = %e, "malformed chart payload"))
            .ok()?;
        let result = envelope.chart.result?.into_iter().next()?;
        let points = to_series(result);
        if points.is_empty() {
            return None;
        }

        let series: Series = Arc::new(points);
        self.store(key, series.clone());
        Some(series)
    }

    /// Last intraday close, falling back to the last daily close
    pub async fn current_price(&self, symbol: &str) -> Option<f64> {
        if let Some(series) = self.chart_series(symbol, "1d", "1m").await {
            if let Some(point) = series.last() {
                return Some(point.close);
            }
        }
        self.chart_series(symbol, "5d", "1d")
            .await
            .and_then(|s| s.last().map(|p| p.close))
    }

    /// (MA50, MA200) from one year of daily closes
    pub async fn moving_averages(&self, symbol: &str) -> (Option<f64>, Option<f64>) {
        match self.chart_series(symbol, "1y", "1d").await {
            Some(series) => (trailing_mean(&series, 50), trailing_mean(&series, 200)),
            None => (None, None),
        }
    }

    pub async fn hourly_move(&self, symbol: &str) -> Option<HourlyMove> {
        let series = self.chart_series(symbol, "1d", "5m").await?;
        hourly_move(&series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn points(closes: &[(i64, f64)]) -> Vec<PricePoint> {
        closes
            .iter()
            .map(|(minute, close)| PricePoint {
                at: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
                close: *close,
            })
            .collect()
    }

    #[test]
    fn test_format_inr() {
        assert_eq!(format_inr(Some(1234.5)), "₹1234.50");
        assert_eq!(format_inr(None), "N/A");
        assert_eq!(format_inr(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn test_trailing_mean_needs_enough_points() {
        let series = points(&[(0, 10.0), (1, 20.0), (2, 30.0)]);
        assert_eq!(trailing_mean(&series, 2), Some(25.0));
        assert_eq!(trailing_mean(&series, 4), None);
    }

    #[test]
    fn test_hourly_move_uses_close_an_hour_back() {
        let series = points(&[(0, 100.0), (30, 101.0), (65, 104.0), (90, 105.0)]);
        // latest at minute 90, cutoff minute 30
        let moved = hourly_move(&series).unwrap();
        assert_eq!(moved.reference, 101.0);
        assert!((moved.change_pct - 3.960396).abs() < 1e-4);
        assert!(moved.is_spike(3.0));
        assert!(!moved.is_spike(5.0));
    }

    #[test]
    fn test_hourly_move_needs_an_hour_of_data() {
        let series = points(&[(0, 100.0), (30, 110.0)]);
        assert!(hourly_move(&series).is_none());
    }

    #[test]
    fn test_null_closes_dropped() {
        let result: ChartResult = serde_json::from_value(json!({
            "timestamp": [1_700_000_000, 1_700_000_060, 1_700_000_120],
            "indicators": { "quote": [{ "close": [10.0, null, 12.0] }] }
        }))
        .unwrap();
        let series = to_series(result);
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].close, 12.0);
    }

    async fn mock_yahoo(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/chart/{symbol}",
            get(
                move |Path(symbol): Path<String>, Query(q): Query<HashMap<String, String>>| {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        if symbol == "MISSING.NS" || q.get("interval").map(String::as_str) == Some("1m") {
                            return Json(json!({ "chart": { "result": null } }));
                        }
                        let n = if q.get("range").map(String::as_str) == Some("1y") { 60 } else { 3 };
                        let ts: Vec<i64> = (0..n).map(|i| 1_700_000_000 + i * 86_400).collect();
                        let closes: Vec<Value> = (0..n).map(|i| json!(100.0 + i as f64)).collect();
                        Json(json!({
                            "chart": { "result": [{
                                "timestamp": ts,
                                "indicators": { "quote": [{ "close": closes }] }
                            }] }
                        }))
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/chart", addr)
    }

    #[tokio::test]
    async fn test_current_price_falls_back_to_daily_and_caches() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = mock_yahoo(hits.clone()).await;
        let yahoo = YahooClient::new(base, Duration::from_secs(60)).unwrap();

        assert_eq!(yahoo.current_price("RELIANCE.NS").await, Some(102.0));
        let after_first = hits.load(Ordering::SeqCst);
        assert_eq!(after_first, 2);

        // empty intraday responses are not cached, the daily series is
        assert_eq!(yahoo.current_price("RELIANCE.NS").await, Some(102.0));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_moving_averages() {
        let base = mock_yahoo(Arc::new(AtomicUsize::new(0))).await;
        let yahoo = YahooClient::new(base, Duration::from_secs(60)).unwrap();

        let (ma50, ma200) = yahoo.moving_averages("RELIANCE.NS").await;
        // closes 100..=159, last fifty are 110..=159
        assert_eq!(ma50, Some(134.5));
        assert_eq!(ma200, None);
        assert_eq!(yahoo.moving_averages("MISSING.NS").await, (None, None));
    }
}
