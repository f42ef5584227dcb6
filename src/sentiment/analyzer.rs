use super::lexicon::FinancialLexicon;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const LABEL_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > LABEL_THRESHOLD {
            SentimentLabel::Positive
        } else if score < -LABEL_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
        }
    }
}

/// Lexicon scoring over text cleaned of links, mentions and markup
#[derive(Default)]
pub struct SentimentAnalyzer {
    lexicon: FinancialLexicon,
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexicon(lexicon: FinancialLexicon) -> Self {
        Self { lexicon }
    }

    pub fn analyze(&self, text: &str) -> (f64, SentimentLabel) {
        let score = self.lexicon.score(&clean_text(text)).score;
        (score, SentimentLabel::from_score(score))
    }
}

/// Drop URLs, @mentions, HTML tags and the `#` of hashtags
pub fn clean_text(text: &str) -> String {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    let noise = NOISE.get_or_init(|| {
        Regex::new(r"https?://\S+|www\.\S+|@\w+|<[^>]*>|&[a-z]+;").unwrap()
    });

    noise
        .replace_all(text, " ")
        .replace('#', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
