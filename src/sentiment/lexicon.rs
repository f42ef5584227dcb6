//! Word scores for market news and social posts
//!
//! Scoring walks the tokens left to right. A negation flips the next scored
//! word, an intensifier scales it, and any unscored word in between resets
//! both modifiers. The text score is the mean of the scored words, clamped
//! to `[-1, 1]`.

use std::collections::{HashMap, HashSet};

const POSITIVE: &[(&str, f64)] = &[
    ("bullish", 0.8),
    ("surge", 0.7),
    ("rally", 0.7),
    ("soar", 0.8),
    ("jump", 0.6),
    ("gain", 0.5),
    ("profit", 0.6),
    ("growth", 0.6),
    ("grow", 0.5),
    ("rise", 0.5),
    ("up", 0.3),
    ("increase", 0.5),
    ("improve", 0.5),
    ("outperform", 0.7),
    ("beat", 0.6),
    ("exceed", 0.6),
    ("strong", 0.5),
    ("robust", 0.5),
    ("positive", 0.5),
    ("optimistic", 0.6),
    ("confident", 0.5),
    ("record", 0.6),
    ("high", 0.4),
    ("upgrade", 0.6),
    ("buy", 0.5),
    ("accumulate", 0.5),
    ("breakout", 0.6),
    ("momentum", 0.4),
    ("recovery", 0.5),
    ("rebound", 0.5),
    ("dividend", 0.4),
    ("bonus", 0.4),
    ("expansion", 0.5),
    ("expand", 0.4),
    ("launch", 0.3),
    ("new", 0.1),
    ("initiative", 0.3),
    ("win", 0.5),
    ("order", 0.3),
    ("approval", 0.4),
    ("approve", 0.4),
    ("acquire", 0.3),
    ("partnership", 0.4),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("bearish", -0.8),
    ("crash", -0.9),
    ("plunge", -0.8),
    ("slump", -0.7),
    ("tumble", -0.7),
    ("drop", -0.6),
    ("fall", -0.5),
    ("decline", -0.6),
    ("loss", -0.6),
    ("down", -0.4),
    ("decrease", -0.5),
    ("weak", -0.5),
    ("negative", -0.5),
    ("pessimistic", -0.6),
    ("concern", -0.5),
    ("worry", -0.5),
    ("fear", -0.6),
    ("risk", -0.4),
    ("volatile", -0.3),
    ("uncertainty", -0.5),
    ("miss", -0.6),
    ("disappoint", -0.7),
    ("underperform", -0.6),
    ("downgrade", -0.6),
    ("sell", -0.5),
    ("selloff", -0.7),
    ("dump", -0.7),
    ("breakdown", -0.6),
    ("correction", -0.4),
    ("crisis", -0.8),
    ("warning", -0.5),
    ("trouble", -0.6),
    ("problem", -0.5),
    ("fail", -0.7),
    ("default", -0.8),
    ("debt", -0.3),
    ("penalty", -0.6),
    ("probe", -0.5),
    ("raid", -0.6),
    ("scam", -0.9),
    ("fraud", -0.9),
    ("resign", -0.4),
    ("layoff", -0.6),
    ("downturn", -0.6),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "neither", "nobody", "nothing", "none", "cannot", "cant", "dont",
    "doesnt", "didnt", "wont", "wouldnt", "shouldnt", "couldnt", "isnt", "arent", "wasnt",
    "werent", "hardly", "barely", "without",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.5),
    ("extremely", 2.0),
    ("highly", 1.5),
    ("sharply", 1.6),
    ("significantly", 1.5),
    ("substantially", 1.5),
    ("dramatically", 1.8),
    ("massively", 1.8),
    ("hugely", 1.7),
    ("slightly", 0.5),
    ("somewhat", 0.7),
    ("marginally", 0.5),
    ("relatively", 0.8),
];

/// Score of one text
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconScore {
    pub score: f64,
    /// Scored words after modifiers, in text order
    pub matched: Vec<(String, f64)>,
}

pub struct FinancialLexicon {
    words: HashMap<String, f64>,
    negations: HashSet<String>,
    intensifiers: HashMap<String, f64>,
}

impl Default for FinancialLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl FinancialLexicon {
    pub fn new() -> Self {
        let words = POSITIVE
            .iter()
            .chain(NEGATIVE)
            .map(|(w, s)| (w.to_string(), *s))
            .collect();

        Self {
            words,
            negations: NEGATIONS.iter().map(|w| w.to_string()).collect(),
            intensifiers: INTENSIFIERS.iter().map(|(w, m)| (w.to_string(), *m)).collect(),
        }
    }

    /// Score of `token`, trying a few inflections ("gains", "surged", "rising")
    pub fn word_score(&self, token: &str) -> Option<f64> {
        if let Some(score) = self.words.get(token) {
            return Some(*score);
        }
        stems(token).find_map(|stem| self.words.get(&stem).copied())
    }

    pub fn is_negation(&self, token: &str) -> bool {
        self.negations.contains(token)
    }

    pub fn intensifier(&self, token: &str) -> Option<f64> {
        self.intensifiers.get(token).copied()
    }

    pub fn add_word(&mut self, word: &str, score: f64) {
        self.words.insert(normalize_token(word), score);
    }

    pub fn score(&self, text: &str) -> LexiconScore {
        let mut matched = Vec::new();
        let mut negate = false;
        let mut multiplier = 1.0;

        for token in text.split_whitespace().map(normalize_token) {
            if token.is_empty() {
                continue;
            }
            if self.is_negation(&token) {
                negate = true;
                continue;
            }
            if let Some(m) = self.intensifier(&token) {
                multiplier = m;
                continue;
            }
            match self.word_score(&token) {
                Some(mut score) => {
                    if negate {
                        score = -score;
                    }
                    matched.push((token, score * multiplier));
                    negate = false;
                    multiplier = 1.0;
                }
                None => {
                    negate = false;
                    multiplier = 1.0;
                }
            }
        }

        let score = if matched.is_empty() {
            0.0
        } else {
            matched.iter().map(|(_, s)| s).sum::<f64>() / matched.len() as f64
        };

        LexiconScore {
            score: score.clamp(-1.0, 1.0),
            matched,
        }
    }
}

/// Lowercase and strip punctuation; apostrophes vanish so "don't" == "dont"
fn normalize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn stems(token: &str) -> impl Iterator<Item = String> + '_ {
    const SUFFIXES: &[&str] = &["ing", "ed", "es", "s"];
    SUFFIXES.iter().flat_map(move |suffix| {
        let mut candidates = Vec::new();
        if let Some(base) = token.strip_suffix(suffix) {
            if base.len() >= 2 {
                candidates.push(base.to_string());
                // "rising" -> "rise", "surged" -> "surge"
                if *suffix == "ing" || *suffix == "ed" {
                    candidates.push(format!("{}e", base));
                }
            }
        }
        candidates
    })
}
