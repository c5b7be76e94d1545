//! Heuristic complexity scoring of bill-splitting requests
//!
//! The score only feeds cost decisions; no text is ever rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lowest possible score
pub const MIN_SCORE: u8 = 1;
/// Highest possible score
pub const MAX_SCORE: u8 = 10;

const FRACTION_WORDS: &[&str] = &["metade", "terço", "terco", "quarto", "half", "third", "quarter"];
const FRACTION_PHRASES: &[&str] = &["por cento", "percent"];
const CONDITIONAL_WORDS: &[&str] = &[
    "se", "caso", "exceto", "menos", "senão", "senao", "if", "unless", "except", "otherwise",
];
const PARTY_WORDS: &[&str] = &[
    "pessoas", "amigos", "amigas", "cada", "todos", "galera", "people", "friends", "each",
    "everyone", "between", "among",
];

/// Increments applied per detected feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityWeights {
    /// Character count above which the length increment applies
    pub long_text_chars: usize,
    pub length: u8,
    pub fraction: u8,
    pub conditional: u8,
    pub multi_currency: u8,
    pub multi_party: u8,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            long_text_chars: 200,
            length: 2,
            fraction: 1,
            conditional: 2,
            multi_currency: 2,
            multi_party: 1,
        }
    }
}

/// Features detected in a request text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplexitySignals {
    pub long_text: bool,
    pub fraction: bool,
    pub conditional: bool,
    pub multi_currency: bool,
    pub multi_party: bool,
}

/// Scores request text on a 1-10 scale
#[derive(Debug, Clone, Default)]
pub struct ComplexityScorer {
    weights: ComplexityWeights,
}

impl ComplexityScorer {
    pub fn new(weights: ComplexityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ComplexityWeights {
        &self.weights
    }

    /// Score `text`, clamped to `[MIN_SCORE, MAX_SCORE]`
    pub fn score(&self, text: &str) -> u8 {
        let signals = self.signals(text);
        let w = &self.weights;
        let mut score = u32::from(MIN_SCORE);
        if signals.long_text {
            score += u32::from(w.length);
        }
        if signals.fraction {
            score += u32::from(w.fraction);
        }
        if signals.conditional {
            score += u32::from(w.conditional);
        }
        if signals.multi_currency {
            score += u32::from(w.multi_currency);
        }
        if signals.multi_party {
            score += u32::from(w.multi_party);
        }
        score.clamp(u32::from(MIN_SCORE), u32::from(MAX_SCORE)) as u8
    }

    /// Detect the individual scoring features
    pub fn signals(&self, text: &str) -> ComplexitySignals {
        let lower = text.to_lowercase();
        let words = tokenize(&lower);

        ComplexitySignals {
            long_text: text.chars().count() > self.weights.long_text_chars,
            fraction: lower.contains('%')
                || FRACTION_PHRASES.iter().any(|p| lower.contains(p))
                || FRACTION_WORDS.iter().any(|w| words.contains(w))
                || has_numeric_fraction(&lower),
            conditional: CONDITIONAL_WORDS.iter().any(|w| words.contains(w)),
            multi_currency: currencies(&lower, &words).len() >= 2,
            multi_party: PARTY_WORDS.iter().any(|w| words.contains(w)),
        }
    }
}

fn tokenize(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// `1/3`, `2/5` and the like
fn has_numeric_fraction(lower: &str) -> bool {
    let chars: Vec<char> = lower.chars().collect();
    chars
        .windows(3)
        .any(|w| w[0].is_ascii_digit() && w[1] == '/' && w[2].is_ascii_digit())
}

/// Distinct currencies mentioned in the text
fn currencies(lower: &str, words: &[&str]) -> BTreeSet<&'static str> {
    let mut found = BTreeSet::new();
    if lower.contains("r$") || words.iter().any(|w| matches!(*w, "brl" | "reais" | "real")) {
        found.insert("BRL");
    }
    if lower.contains("us$")
        || words
            .iter()
            .any(|w| matches!(*w, "usd" | "dólar" | "dólares" | "dolar" | "dolares" | "dollar" | "dollars"))
    {
        found.insert("USD");
    }
    if lower.contains('€') || words.iter().any(|w| matches!(*w, "eur" | "euro" | "euros")) {
        found.insert("EUR");
    }
    if lower.contains('£') || words.iter().any(|w| matches!(*w, "gbp" | "libra" | "libras")) {
        found.insert("GBP");
    }
    // A bare `$` not part of `R$` / `US$`
    let chars: Vec<char> = lower.chars().collect();
    let bare_dollar = chars
        .iter()
        .enumerate()
        .any(|(i, c)| *c == '$' && (i == 0 || !matches!(chars[i - 1], 'r' | 's')));
    if bare_dollar {
        found.insert("USD");
    }
    found
}
