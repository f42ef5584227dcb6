//! Aggregated sentiment for one stock and the chart data derived from it

use super::analyzer::SentimentLabel;
use super::sources::SourceKind;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Scored items kept in a report, newest first
pub const MAX_REPORT_ITEMS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub source: SourceKind,
    pub text: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub score: f64,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Distribution {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl Distribution {
    fn add(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Negative => self.negative += 1,
            SentimentLabel::Neutral => self.neutral += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }

    /// Share of the largest bucket
    pub fn agreement(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.positive.max(self.negative).max(self.neutral) as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub source: SourceKind,
    pub count: usize,
    pub average_sentiment: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mood {
    #[serde(rename = "Very Bullish")]
    VeryBullish,
    Bullish,
    Neutral,
    Bearish,
    #[serde(rename = "Very Bearish")]
    VeryBearish,
}

impl Mood {
    pub fn from_average(average: f64) -> Self {
        if average > 0.5 {
            Mood::VeryBullish
        } else if average > 0.15 {
            Mood::Bullish
        } else if average < -0.5 {
            Mood::VeryBearish
        } else if average < -0.15 {
            Mood::Bearish
        } else {
            Mood::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_distribution(distribution: &Distribution) -> Self {
        let total = distribution.total();
        if total >= 20 && distribution.agreement() >= 0.6 {
            Confidence::High
        } else if total >= 5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub overall_mood: Mood,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentReport {
    pub stock_symbol: String,
    pub company_name: String,
    pub hours_back: i64,
    pub average_sentiment: f64,
    pub total_data_points: usize,
    pub distribution: Distribution,
    pub sources: Vec<SourceBreakdown>,
    pub items: Vec<ScoredItem>,
    pub summary: ReportSummary,
    pub generated_at: DateTime<Utc>,
    /// Every scored item, for the charts; not serialized
    #[serde(skip)]
    pub all_items: Vec<ScoredItem>,
}

impl SentimentReport {
    pub fn build(
        stock_symbol: &str,
        company_name: &str,
        hours_back: i64,
        mut items: Vec<ScoredItem>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let mut distribution = Distribution::default();
        let mut by_source: IndexMap<SourceKind, (usize, f64)> = IndexMap::new();
        for item in &items {
            distribution.add(item.label);
            let entry = by_source.entry(item.source).or_default();
            entry.0 += 1;
            entry.1 += item.score;
        }

        let total = items.len();
        let average_sentiment = if total == 0 {
            0.0
        } else {
            round3(items.iter().map(|i| i.score).sum::<f64>() / total as f64)
        };

        let sources = by_source
            .into_iter()
            .map(|(source, (count, sum))| SourceBreakdown {
                source,
                count,
                average_sentiment: round3(sum / count as f64),
            })
            .collect();

        let summary = ReportSummary {
            overall_mood: Mood::from_average(average_sentiment),
            confidence: Confidence::from_distribution(&distribution),
        };

        Self {
            stock_symbol: stock_symbol.to_string(),
            company_name: company_name.to_string(),
            hours_back,
            average_sentiment,
            total_data_points: total,
            distribution,
            sources,
            items: items.iter().take(MAX_REPORT_ITEMS).cloned().collect(),
            summary,
            generated_at,
            all_items: items,
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePoint {
    pub hour: DateTime<Utc>,
    pub average_sentiment: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: SentimentLabel,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSeries {
    pub source: SourceKind,
    pub points: Vec<TimelinePoint>,
}

/// Chart-ready series for the sentiment dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visualizations {
    pub timeline: Vec<TimelinePoint>,
    pub distribution: Vec<LabelCount>,
    pub sources: Vec<SourceSeries>,
}

pub fn visualizations(report: &SentimentReport) -> Visualizations {
    let timeline = hourly(report.all_items.iter());

    let distribution = vec![
        LabelCount {
            label: SentimentLabel::Positive,
            count: report.distribution.positive,
        },
        LabelCount {
            label: SentimentLabel::Neutral,
            count: report.distribution.neutral,
        },
        LabelCount {
            label: SentimentLabel::Negative,
            count: report.distribution.negative,
        },
    ];

    let sources = report
        .sources
        .iter()
        .map(|breakdown| SourceSeries {
            source: breakdown.source,
            points: hourly(
                report
                    .all_items
                    .iter()
                    .filter(|i| i.source == breakdown.source),
            ),
        })
        .collect();

    Visualizations {
        timeline,
        distribution,
        sources,
    }
}

/// Mean score per UTC hour, oldest hour first
fn hourly<'a>(items: impl Iterator<Item = &'a ScoredItem>) -> Vec<TimelinePoint> {
    let mut buckets: BTreeMap<DateTime<Utc>, (usize, f64)> = BTreeMap::new();
    for item in items {
        let hour = item
            .published_at
            .duration_trunc(TimeDelta::hours(1))
            .unwrap_or(item.published_at);
        let entry = buckets.entry(hour).or_default();
        entry.0 += 1;
        entry.1 += item.score;
    }

    buckets
        .into_iter()
        .map(|(hour, (count, sum))| TimelinePoint {
            hour,
            average_sentiment: round3(sum / count as f64),
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(source: SourceKind, score: f64, hour: u32, minute: u32) -> ScoredItem {
        ScoredItem {
            source,
            text: format!("text {score}"),
            url: None,
            published_at: Utc.with_ymd_and_hms(2024, 3, 13, hour, minute, 0).unwrap(),
            score,
            label: SentimentLabel::from_score(score),
        }
    }

    #[test]
    fn test_mood_thresholds() {
        assert_eq!(Mood::from_average(0.6), Mood::VeryBullish);
        assert_eq!(Mood::from_average(0.2), Mood::Bullish);
        assert_eq!(Mood::from_average(0.15), Mood::Neutral);
        assert_eq!(Mood::from_average(-0.2), Mood::Bearish);
        assert_eq!(Mood::from_average(-0.9), Mood::VeryBearish);
        assert_eq!(serde_json::to_value(Mood::VeryBullish).unwrap(), "Very Bullish");
    }

    #[test]
    fn test_confidence_rules() {
        let strong = Distribution {
            positive: 15,
            negative: 3,
            neutral: 2,
        };
        assert_eq!(Confidence::from_distribution(&strong), Confidence::High);

        let split = Distribution {
            positive: 10,
            negative: 10,
            neutral: 5,
        };
        assert_eq!(Confidence::from_distribution(&split), Confidence::Medium);

        let few = Distribution {
            positive: 4,
            negative: 0,
            neutral: 0,
        };
        assert_eq!(Confidence::from_distribution(&few), Confidence::Low);
    }

    #[test]
    fn test_build_report() {
        let items = vec![
            item(SourceKind::Twitter, 0.5, 9, 10),
            item(SourceKind::News, -0.2, 10, 5),
            item(SourceKind::Twitter, 0.3, 9, 40),
        ];
        let now = Utc::now();
        let report = SentimentReport::build("RELIANCE", "Reliance", 24, items, now);

        assert_eq!(report.total_data_points, 3);
        assert_eq!(report.average_sentiment, 0.2);
        assert_eq!(report.summary.overall_mood, Mood::Bullish);
        assert_eq!(report.summary.confidence, Confidence::Low);
        assert_eq!(report.distribution.positive, 2);
        assert_eq!(report.distribution.negative, 1);
        // newest first
        assert_eq!(report.items[0].source, SourceKind::News);

        assert_eq!(report.sources.len(), 2);
        let twitter = report
            .sources
            .iter()
            .find(|s| s.source == SourceKind::Twitter)
            .unwrap();
        assert_eq!(twitter.count, 2);
        assert_eq!(twitter.average_sentiment, 0.4);
    }

    #[test]
    fn test_empty_report_is_neutral() {
        let report = SentimentReport::build("X", "X Ltd", 6, Vec::new(), Utc::now());
        assert_eq!(report.average_sentiment, 0.0);
        assert_eq!(report.summary.overall_mood, Mood::Neutral);
        assert_eq!(report.summary.confidence, Confidence::Low);
        let charts = visualizations(&report);
        assert!(charts.timeline.is_empty());
        assert_eq!(charts.distribution.iter().map(|d| d.count).sum::<usize>(), 0);
    }

    #[test]
    fn test_visualizations_bucket_by_hour() {
        let items = vec![
            item(SourceKind::Twitter, 0.5, 9, 10),
            item(SourceKind::Twitter, 0.3, 9, 40),
            item(SourceKind::News, -0.2, 10, 5),
        ];
        let report = SentimentReport::build("RELIANCE", "Reliance", 24, items, Utc::now());
        let charts = visualizations(&report);

        assert_eq!(charts.timeline.len(), 2);
        assert_eq!(
            charts.timeline[0].hour,
            Utc.with_ymd_and_hms(2024, 3, 13, 9, 0, 0).unwrap()
        );
        assert_eq!(charts.timeline[0].count, 2);
        assert_eq!(charts.timeline[0].average_sentiment, 0.4);

        let news = charts
            .sources
            .iter()
            .find(|s| s.source == SourceKind::News)
            .unwrap();
        assert_eq!(news.points.len(), 1);
        assert_eq!(news.points[0].average_sentiment, -0.2);
    }
}
