// Style Feature Scorer
// Six statistical sub-scores per sentence, combined into a human-likeness score

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::services::config_store::ConfigError;
use crate::services::text_processor::tokenize_words;

const BURSTINESS_CEILING: f64 = 20.0;
const OPTIMAL_PUNCT_DENSITY: f64 = 0.10;
const PUNCT_VARIETY_CAP: f64 = 3.0;
const OPTIMAL_SENTENCE_WORDS: f64 = 20.0;
const OPTIMAL_CLAUSE_DENSITY: f64 = 0.15;
const ENTROPY_CEILING_BITS: f64 = 3.5;
const NEUTRAL: f64 = 0.5;

// Rank 1 is the most common word
const COMMON_WORDS: [&str; 100] = [
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "i",
    "it", "for", "not", "on", "with", "he", "as", "you", "do", "at",
    "this", "but", "his", "by", "from", "they", "we", "say", "her", "she",
    "or", "an", "will", "my", "one", "all", "would", "there", "their", "what",
    "so", "up", "out", "if", "about", "who", "get", "which", "go", "me",
    "when", "make", "can", "like", "time", "no", "just", "him", "know", "take",
    "people", "into", "year", "your", "good", "some", "could", "them", "see", "other",
    "than", "then", "now", "look", "only", "come", "its", "over", "think", "also",
    "back", "after", "use", "two", "how", "our", "work", "first", "well", "way",
    "even", "new", "want", "because", "any", "these", "give", "day", "most", "us",
];

fn common_word_ranks() -> &'static HashMap<&'static str, usize> {
    static RANKS: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();
    RANKS.get_or_init(|| {
        COMMON_WORDS
            .iter()
            .enumerate()
            .map(|(i, w)| (*w, i + 1))
            .collect()
    })
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.,!?;:\-\u{2014}\u{2026}]").expect("punctuation regex"))
}

fn clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[,;]|\band\b|\bbut\b|\bor\b|\bif\b|\bwhen\b").expect("clause regex")
    })
}

/// Feature weights and the calibration offset, validated at load time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleWeights {
    pub burstiness: f64,
    pub vocabulary_richness: f64,
    pub word_frequency: f64,
    pub punctuation: f64,
    pub complexity: f64,
    pub entropy: f64,
    /// Subtracted from the weighted sum, floored at zero
    pub offset: f64,
}

impl Default for StyleWeights {
    fn default() -> Self {
        Self {
            burstiness: 0.10,
            vocabulary_richness: 0.25,
            word_frequency: 0.20,
            punctuation: 0.20,
            complexity: 0.10,
            entropy: 0.15,
            offset: 0.03,
        }
    }
}

impl StyleWeights {
    fn as_array(&self) -> [f64; 6] {
        [
            self.burstiness,
            self.vocabulary_richness,
            self.word_frequency,
            self.punctuation,
            self.complexity,
            self.entropy,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "styleWeights must be finite and non-negative".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "styleWeights must sum to 1 (got {:.4})",
                sum
            )));
        }
        if !(0.0..=0.5).contains(&self.offset) {
            return Err(ConfigError::Invalid("styleWeights.offset must be within [0, 0.5]".into()));
        }
        Ok(())
    }
}

/// Per-sentence sub-scores. Higher means more human-like.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub burstiness: f64,
    pub vocabulary_richness: f64,
    pub word_frequency: f64,
    pub punctuation: f64,
    pub complexity: f64,
    pub entropy: f64,
    pub score: f64,
}

impl FeatureVector {
    pub fn neutral() -> Self {
        Self {
            burstiness: NEUTRAL,
            vocabulary_richness: NEUTRAL,
            word_frequency: NEUTRAL,
            punctuation: NEUTRAL,
            complexity: NEUTRAL,
            entropy: NEUTRAL,
            score: NEUTRAL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleScorer {
    weights: StyleWeights,
}

impl StyleScorer {
    pub fn new(weights: StyleWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &StyleWeights {
        &self.weights
    }

    pub fn score(&self, sentence: &str) -> FeatureVector {
        if sentence.trim().is_empty() {
            return FeatureVector::neutral();
        }

        let tokens = tokenize_words(sentence);
        let burstiness = burstiness(&tokens);
        let vocabulary_richness = vocabulary_richness(&tokens);
        let word_frequency = word_frequency_balance(&tokens);
        let punctuation = punctuation_regularity(sentence);
        let complexity = structural_complexity(sentence, &tokens);
        let entropy = length_entropy(&tokens);

        let w = &self.weights;
        let raw = burstiness * w.burstiness
            + vocabulary_richness * w.vocabulary_richness
            + word_frequency * w.word_frequency
            + punctuation * w.punctuation
            + complexity * w.complexity
            + entropy * w.entropy;
        let score = (raw - w.offset).max(0.0);

        FeatureVector {
            burstiness: round4(burstiness),
            vocabulary_richness: round4(vocabulary_richness),
            word_frequency: round4(word_frequency),
            punctuation: round4(punctuation),
            complexity: round4(complexity),
            entropy: round4(entropy),
            score: round4(score),
        }
    }
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn token_lengths(tokens: &[String]) -> Vec<usize> {
    tokens.iter().map(|t| t.chars().count()).collect()
}

fn burstiness(tokens: &[String]) -> f64 {
    if tokens.len() < 2 {
        return NEUTRAL;
    }
    let lengths = token_lengths(tokens);
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<usize>() as f64 / n;
    let variance = lengths
        .iter()
        .map(|&l| (l as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (variance / BURSTINESS_CEILING).min(1.0)
}

fn vocabulary_richness(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return NEUTRAL;
    }
    let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    unique.len() as f64 / tokens.len() as f64
}

fn word_frequency_balance(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return NEUTRAL;
    }
    let ranks = common_word_ranks();
    let avg = tokens
        .iter()
        .map(|t| match ranks.get(t.as_str()) {
            Some(&rank) => 1.0 - rank as f64 / 100.0,
            None => 1.0,
        })
        .sum::<f64>()
        / tokens.len() as f64;
    // Mid-range vocabularies score highest
    1.0 - (avg - 0.5).abs() * 2.0
}

fn punctuation_regularity(sentence: &str) -> f64 {
    let total_chars = sentence.chars().count();
    if total_chars == 0 {
        return NEUTRAL;
    }
    let marks: Vec<&str> = punctuation_re()
        .find_iter(sentence)
        .map(|m| m.as_str())
        .collect();
    let density = marks.len() as f64 / total_chars as f64;
    let variety = marks.iter().collect::<HashSet<_>>().len() as f64;

    let density_score =
        1.0 - ((density - OPTIMAL_PUNCT_DENSITY).abs() / OPTIMAL_PUNCT_DENSITY).min(1.0);
    let variety_score = (variety / PUNCT_VARIETY_CAP).min(1.0);
    density_score * 0.7 + variety_score * 0.3
}

fn structural_complexity(sentence: &str, tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return NEUTRAL;
    }
    let words = tokens.len() as f64;
    let clauses = clause_re().find_iter(&sentence.to_lowercase()).count() as f64;

    let length_score =
        1.0 - ((words - OPTIMAL_SENTENCE_WORDS).abs() / OPTIMAL_SENTENCE_WORDS).min(1.0);
    let clause_density = clauses / words.max(1.0);
    let clause_score =
        1.0 - ((clause_density - OPTIMAL_CLAUSE_DENSITY).abs() / OPTIMAL_CLAUSE_DENSITY).min(1.0);
    length_score * 0.6 + clause_score * 0.4
}

fn length_entropy(tokens: &[String]) -> f64 {
    if tokens.len() < 2 {
        return NEUTRAL;
    }
    let mut histogram: HashMap<usize, usize> = HashMap::new();
    for len in token_lengths(tokens) {
        *histogram.entry(len).or_insert(0) += 1;
    }
    let total = tokens.len() as f64;
    let entropy: f64 = histogram
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();
    (entropy / ENTROPY_CEILING_BITS).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_features(fv: &FeatureVector) -> [f64; 7] {
        [
            fv.burstiness,
            fv.vocabulary_richness,
            fv.word_frequency,
            fv.punctuation,
            fv.complexity,
            fv.entropy,
            fv.score,
        ]
    }

    #[test]
    fn test_default_weights_are_valid() {
        assert!(StyleWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = StyleWeights {
            entropy: 0.5,
            ..StyleWeights::default()
        };
        assert!(weights.validate().is_err());

        let negative = StyleWeights {
            burstiness: -0.1,
            vocabulary_richness: 0.45,
            ..StyleWeights::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_empty_sentence_is_neutral() {
        let scorer = StyleScorer::default();
        assert_eq!(scorer.score(""), FeatureVector::neutral());
        assert_eq!(scorer.score("   "), FeatureVector::neutral());
    }

    #[test]
    fn test_degenerate_sentences_stay_in_range() {
        let scorer = StyleScorer::default();
        for s in ["Hello", "...", "a", "!!!???", "x."] {
            let fv = scorer.score(s);
            for v in all_features(&fv) {
                assert!(v.is_finite(), "{} produced non-finite feature", s);
                assert!((0.0..=1.0).contains(&v), "{} produced {}", s, v);
            }
        }
    }

    #[test]
    fn test_repeated_common_word() {
        // burstiness 0, ttr 1/3, frequency balance 0.02, punctuation 0,
        // complexity 0.09, entropy 0 => 0.096333 - 0.03
        let fv = StyleScorer::default().score("the the the");
        assert_eq!(fv.burstiness, 0.0);
        assert_eq!(fv.vocabulary_richness, 0.3333);
        assert_eq!(fv.word_frequency, 0.02);
        assert_eq!(fv.punctuation, 0.0);
        assert_eq!(fv.complexity, 0.09);
        assert_eq!(fv.entropy, 0.0);
        assert_eq!(fv.score, 0.0663);
    }

    #[test]
    fn test_varied_sentence_scores_higher_than_repetition() {
        let scorer = StyleScorer::default();
        let varied = scorer.score(
            "Yesterday, my grandmother baked an enormous rhubarb pie; nobody expected it, but we ate everything.",
        );
        let flat = scorer.score("the the the");
        assert!(varied.score > flat.score);
        assert_eq!(varied.vocabulary_richness, 1.0);
    }

    #[test]
    fn test_offset_floors_at_zero() {
        let weights = StyleWeights {
            offset: 0.5,
            ..StyleWeights::default()
        };
        let fv = StyleScorer::new(weights).score("the the the");
        assert_eq!(fv.score, 0.0);
    }
}
