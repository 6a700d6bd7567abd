//! Coordinate derivation from exchange text.

#![allow(clippy::cast_precision_loss)]

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::coordinate::{COORDINATE_DIMENSIONS, Coordinate};
use crate::{EngineError, EngineResult};

/// Outcome of deriving a coordinate from exchange text.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    coordinate: Coordinate,
    summary: String,
}

impl Derivation {
    /// Creates a derivation outcome.
    #[must_use]
    pub fn new(coordinate: Coordinate, summary: impl Into<String>) -> Self {
        Self {
            coordinate,
            summary: summary.into(),
        }
    }

    /// Returns the derived coordinate.
    #[must_use]
    pub const fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Returns the derived summary line.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// Maps exchange text onto the shared coordinate space.
///
/// Implementations must be deterministic and side-effect free: the same text
/// pair always yields the same coordinate within a process, and derivation
/// performs no I/O.
pub trait CoordinateDeriver: Send + Sync {
    /// Derives a coordinate and summary for a user/response text pair.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when either text is empty or
    /// whitespace-only.
    fn derive(&self, user_text: &str, response_text: &str) -> EngineResult<Derivation>;

    /// Derives a coordinate for a standalone query text.
    ///
    /// The default implementation reuses [`derive`](Self::derive) with the
    /// query standing in for both sides of the exchange.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] when the query text is empty or
    /// whitespace-only.
    fn derive_query(&self, query_text: &str) -> EngineResult<Derivation> {
        self.derive(query_text, query_text)
    }
}

/// Default deriver computing cheap lexical statistics.
///
/// No trained model is involved: components come from surface features of
/// the text (length balance, word shapes, hashed token buckets, question and
/// pronoun signals), each bounded to `[-1.0, 1.0]`. The individual features
/// are not contractual; any [`CoordinateDeriver`] composes with the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalDeriver;

impl LexicalDeriver {
    /// Creates the deriver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CoordinateDeriver for LexicalDeriver {
    fn derive(&self, user_text: &str, response_text: &str) -> EngineResult<Derivation> {
        if user_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("user text must not be empty"));
        }
        if response_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("response text must not be empty"));
        }

        let user_tokens = tokens(user_text);
        let mut all_tokens = user_tokens.clone();
        all_tokens.extend(tokens(response_text));
        let concept = concept_axes(&all_tokens);

        let mut values = [0.0_f64; COORDINATE_DIMENSIONS];
        values[0] = length_balance(user_text, response_text);
        values[1] = word_shape(user_text, response_text);
        values[2] = punctuation_density(user_text, response_text);
        values[3] = concept[0];
        values[4] = concept[1];
        values[5] = concept[2];
        values[6] = question_signal(user_text);
        values[7] = pronoun_balance(&all_tokens);
        values[8] = vocabulary_spread(&user_tokens);

        let coordinate = Coordinate::new(values)?;
        Ok(Derivation::new(coordinate, summarise(user_text)))
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|raw| !raw.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn length_balance(user_text: &str, response_text: &str) -> f64 {
    let user = user_text.chars().count() as f64;
    let response = response_text.chars().count() as f64;
    (user - response) / (user + response)
}

fn word_shape(user_text: &str, response_text: &str) -> f64 {
    let mut chars = 0_usize;
    let mut count = 0_usize;
    for word in user_text
        .split_whitespace()
        .chain(response_text.split_whitespace())
    {
        chars += word.chars().count();
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    let average = chars as f64 / count as f64;
    (average / 6.0 - 1.0).clamp(-1.0, 1.0)
}

fn punctuation_density(user_text: &str, response_text: &str) -> f64 {
    let mut punctuation = 0_usize;
    let mut total = 0_usize;
    for ch in user_text.chars().chain(response_text.chars()) {
        if ch.is_ascii_punctuation() {
            punctuation += 1;
        }
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    (punctuation as f64 / total as f64 * 10.0).min(1.0)
}

/// Spreads hashed tokens over the three conceptual axes.
///
/// Each token votes on one axis with a signed weight taken from its hash, and
/// votes are averaged so every axis stays within `[-1.0, 1.0]`.
fn concept_axes(tokens: &[String]) -> [f64; 3] {
    let mut sums = [0.0_f64; 3];
    if tokens.is_empty() {
        return sums;
    }

    for token in tokens {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let digest = hasher.finish();

        let axis = (digest % 3) as usize;
        let magnitude = ((digest >> 3) % 1000) as f64 / 999.0;
        let weight = if digest & 0b100 == 0 {
            magnitude
        } else {
            -magnitude
        };
        sums[axis] += weight;
    }

    let scale = tokens.len() as f64;
    [sums[0] / scale, sums[1] / scale, sums[2] / scale]
}

fn question_signal(text: &str) -> f64 {
    let questions = text.chars().filter(|c| *c == '?').count();
    (questions as f64 / 2.0).min(1.0)
}

const FIRST_PERSON: [&str; 6] = ["i", "me", "my", "mine", "we", "our"];
const SECOND_PERSON: [&str; 4] = ["you", "your", "yours", "yourself"];

fn pronoun_balance(tokens: &[String]) -> f64 {
    let first = tokens
        .iter()
        .filter(|token| FIRST_PERSON.contains(&token.as_str()))
        .count();
    let second = tokens
        .iter()
        .filter(|token| SECOND_PERSON.contains(&token.as_str()))
        .count();
    let total = first + second;
    if total == 0 {
        return 0.0;
    }
    (first as f64 - second as f64) / total as f64
}

fn vocabulary_spread(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    let ratio = distinct.len() as f64 / tokens.len() as f64;
    2.0 * ratio - 1.0
}

fn summarise(user_text: &str) -> String {
    const MAX_WORDS: usize = 8;
    let mut words = user_text.split_whitespace();
    let mut summary = words
        .by_ref()
        .take(MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    if words.next().is_some() {
        summary.push_str(" ...");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let deriver = LexicalDeriver::new();
        let first = deriver
            .derive("Where is my booking?", "Your booking is confirmed for Tuesday.")
            .unwrap();
        let second = deriver
            .derive("Where is my booking?", "Your booking is confirmed for Tuesday.")
            .unwrap();
        assert_eq!(first.coordinate().as_slice(), second.coordinate().as_slice());
        assert_eq!(first.summary(), second.summary());
    }

    #[test]
    fn components_stay_bounded() {
        let deriver = LexicalDeriver::new();
        let derivation = deriver
            .derive(
                "Why?! Is... this -- really??? happening!!! now, here, today???",
                "ok",
            )
            .unwrap();
        assert!(
            derivation
                .coordinate()
                .as_slice()
                .iter()
                .all(|value| value.is_finite() && value.abs() <= 1.0)
        );
    }

    #[test]
    fn rejects_blank_inputs() {
        let deriver = LexicalDeriver::new();
        for (user, response) in [("", "hi"), ("   ", "hi"), ("hi", ""), ("hi", "  \t ")] {
            let err = deriver.derive(user, response).expect_err("blank text");
            assert!(matches!(err, EngineError::InvalidInput(_)));
        }
    }

    #[test]
    fn query_derivation_matches_self_pair() {
        let deriver = LexicalDeriver::new();
        let query = deriver.derive_query("where did my booking go?").unwrap();
        let pair = deriver
            .derive("where did my booking go?", "where did my booking go?")
            .unwrap();
        assert_eq!(query.coordinate().as_slice(), pair.coordinate().as_slice());
    }

    #[test]
    fn question_texts_sit_apart_from_statements() {
        let deriver = LexicalDeriver::new();
        let question = deriver
            .derive("What is the capital of France?", "The capital of France is Paris.")
            .unwrap();
        let statement = deriver
            .derive(
                "Restart the billing job for tenant nine",
                "Billing job restarted without errors.",
            )
            .unwrap();
        assert!(question.coordinate().distance(statement.coordinate()) > 0.0);
    }

    #[test]
    fn summary_truncates_long_inputs() {
        let deriver = LexicalDeriver::new();
        let derivation = deriver
            .derive(
                "one two three four five six seven eight nine ten",
                "short answer",
            )
            .unwrap();
        assert_eq!(
            derivation.summary(),
            "one two three four five six seven eight ..."
        );

        let short = deriver.derive("just checking in", "hello there").unwrap();
        assert_eq!(short.summary(), "just checking in");
    }
}
