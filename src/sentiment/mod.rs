//! News and social sentiment for a stock
//!
//! `SentimentService` fans out to every configured source concurrently,
//! scores each item with the financial lexicon and aggregates the result
//! into a `SentimentReport`. A failing source is logged and left out of the
//! report.

pub mod analyzer;
pub mod lexicon;
pub mod report;
pub mod sources;

pub use analyzer::{SentimentAnalyzer, SentimentLabel};
pub use lexicon::FinancialLexicon;
pub use report::{
    Confidence, Distribution, Mood, ScoredItem, SentimentReport, Visualizations, visualizations,
};
pub use sources::{NewsApiSource, RawItem, RssNewsSource, SentimentSource, SourceKind, TwitterSource};

use crate::config::AppConfig;
use crate::core::error::AppResult;
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use std::sync::Arc;

/// Twitter recent search only reaches back seven days
pub const MAX_HOURS_BACK: i64 = 168;

#[derive(Clone)]
pub struct SentimentService {
    analyzer: Arc<SentimentAnalyzer>,
    sources: Vec<Arc<dyn SentimentSource>>,
}

impl SentimentService {
    pub fn new(sources: Vec<Arc<dyn SentimentSource>>) -> Self {
        Self {
            analyzer: Arc::new(SentimentAnalyzer::new()),
            sources,
        }
    }

    /// Sources for every configured credential, plus both RSS feeds
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let endpoints = &config.endpoints;
        let mut sources: Vec<Arc<dyn SentimentSource>> = Vec::new();

        match &config.twitter_bearer_token {
            Some(token) => sources.push(Arc::new(TwitterSource::new(&endpoints.twitter_api, token)?)),
            None => tracing::warn!("Twitter Bearer Token not found. Twitter sentiment disabled."),
        }
        match &config.news_api_key {
            Some(key) => sources.push(Arc::new(NewsApiSource::new(&endpoints.news_api, key)?)),
            None => tracing::warn!("News API key not found. NewsAPI sentiment disabled."),
        }
        sources.push(Arc::new(RssNewsSource::moneycontrol(&endpoints.moneycontrol_rss)?));
        sources.push(Arc::new(RssNewsSource::economic_times(&endpoints.economic_times_rss)?));

        Ok(Self::new(sources))
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    pub fn analyzer(&self) -> &SentimentAnalyzer {
        &self.analyzer
    }

    pub async fn analyze_stock(
        &self,
        stock_symbol: &str,
        company_name: &str,
        hours_back: i64,
    ) -> SentimentReport {
        let hours_back = hours_back.clamp(1, MAX_HOURS_BACK);
        let now = Utc::now();
        let since = now - ChronoDuration::hours(hours_back);

        let fetches = self
            .sources
            .iter()
            .map(|source| source.fetch(stock_symbol, company_name, since));
        let results = join_all(fetches).await;

        let mut scored = Vec::new();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(items) => {
                    tracing::debug!(source = source.kind().name(), count = items.len(), "sentiment items fetched");
                    scored.extend(items.into_iter().map(|item| self.score(item)));
                }
                Err(e) => {
                    tracing::warn!(source = source.kind().name(), symbol = %stock_symbol, error = %e, "sentiment source failed");
                }
            }
        }

        SentimentReport::build(stock_symbol, company_name, hours_back, scored, now)
    }

    fn score(&self, item: RawItem) -> ScoredItem {
        let (score, label) = self.analyzer.analyze(&item.text);
        ScoredItem {
            source: item.source,
            text: item.text,
            url: item.url,
            published_at: item.published_at,
            score,
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{AppError, UpstreamError};
    use async_trait::async_trait;
    use chrono::DateTime;

    struct Canned(SourceKind, Vec<&'static str>);

    #[async_trait]
    impl SentimentSource for Canned {
        fn kind(&self) -> SourceKind {
            self.0
        }

        async fn fetch(&self, _: &str, _: &str, _: DateTime<Utc>) -> AppResult<Vec<RawItem>> {
            Ok(self
                .1
                .iter()
                .map(|text| RawItem {
                    source: self.0,
                    text: text.to_string(),
                    url: None,
                    published_at: Utc::now(),
                })
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl SentimentSource for Broken {
        fn kind(&self) -> SourceKind {
            SourceKind::News
        }

        async fn fetch(&self, _: &str, _: &str, _: DateTime<Utc>) -> AppResult<Vec<RawItem>> {
            Err(AppError::Upstream(UpstreamError::RateLimited { service: "newsapi" }))
        }
    }

    #[tokio::test]
    async fn test_failed_source_is_skipped() {
        let service = SentimentService::new(vec![
            Arc::new(Canned(
                SourceKind::Twitter,
                vec!["Reliance shares surge", "Reliance rally continues"],
            )),
            Arc::new(Broken),
        ]);

        let report = service.analyze_stock("RELIANCE", "Reliance", 24).await;
        assert_eq!(report.total_data_points, 2);
        assert_eq!(report.sources.len(), 1);
        assert!(report.average_sentiment > 0.0);
    }

    #[tokio::test]
    async fn test_hours_back_is_clamped() {
        let service = SentimentService::new(Vec::new());
        assert_eq!(service.analyze_stock("X", "X", 0).await.hours_back, 1);
        assert_eq!(service.analyze_stock("X", "X", 10_000).await.hours_back, MAX_HOURS_BACK);
    }

    #[test]
    fn test_unconfigured_credentials_leave_rss_only() {
        let service = SentimentService::from_config(&AppConfig::default()).unwrap();
        assert_eq!(
            service.source_kinds(),
            vec![SourceKind::Moneycontrol, SourceKind::EconomicTimes]
        );
    }
}
