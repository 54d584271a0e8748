// AI Phrase-Pattern Scorer
// Stock phrasing, formality and vagueness markers typical of generated text

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use super::style_scorer::round4;
use crate::services::text_processor::tokenize_words;

const BUZZWORDS: &[&str] = &[
    "comprehensive", "exceptional", "proficiency", "leverage", "utilize", "facilitate",
    "implement", "demonstrate", "esteemed", "seamlessly", "consistently", "diverse", "enabling",
    "encompasses", "objectives", "capabilities", "methodologies", "adept", "exemplary",
];

const GENERIC_PHRASES: &[&str] = &[
    r"i am writing to express my (?:strong )?interest",
    r"proven track record",
    r"comprehensive background",
    r"high-quality solutions",
    r"excellent addition to (?:your|the) (?:esteemed )?team",
    r"demonstrated exceptional",
    r"wide range of",
    r"enabling me to",
    r"adapt seamlessly",
    r"throughout my (?:professional )?career",
    r"i am confident that",
    r"i would be (?:an )?excellent",
    r"possess (?:a )?strong",
    r"my experience encompasses",
];

const REPEATED_PATTERNS: &[&str] = &[
    r"\bI am \w+",
    r"\bI have \w+",
    r"\bFurthermore,?",
    r"\bMoreover,?",
    r"\bAdditionally,?",
    r"\bIn addition,?",
    r"\b(?:my|the) (?:comprehensive|robust|extensive|strong)\b",
    r"\bwill enable me to\b",
    r"\bI would be\b",
    r"\blooking forward to\b",
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("pattern regex")
        })
        .collect()
}

fn generic_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| compile_all(GENERIC_PHRASES))
}

fn repeated_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| compile_all(REPEATED_PATTERNS))
}

fn sentence_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+").expect("sentence split regex"))
}

fn contraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+['\u{2019}](?:m|re|s|t|ve|d|ll)\b").expect("contraction regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+%?").expect("number regex"))
}

fn proper_noun_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+(?:[A-Z][a-z]+)*\b").expect("proper noun regex"))
}

fn formal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:thus|hence|moreover|furthermore|additionally|consequently|therefore|whereby)\b",
        )
        .expect("formal marker regex")
    })
}

/// Pattern sub-scores. Every field is AI-leaning: 1.0 means most AI-like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternFeatures {
    pub buzzword_density: f64,
    pub generic_phrases: f64,
    pub contraction_absence: f64,
    pub vagueness: f64,
    pub length_uniformity: f64,
    pub formality: f64,
    pub repetition: f64,
}

impl PatternFeatures {
    fn ai_score(&self) -> f64 {
        self.buzzword_density * 0.18
            + self.generic_phrases * 0.22
            + self.contraction_absence * 0.12
            + self.vagueness * 0.18
            + self.length_uniformity * 0.08
            + self.formality * 0.08
            + self.repetition * 0.14
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternScore {
    pub features: PatternFeatures,
    /// `1 - ai_score`; higher is more human-like
    pub human_score: f64,
}

pub fn pattern_features(text: &str) -> Option<PatternFeatures> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = text.split_whitespace().collect();
    let sentences: Vec<&str> = sentence_split_re()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if words.is_empty() || sentences.is_empty() {
        return None;
    }
    let n_words = words.len() as f64;
    let n_sentences = sentences.len() as f64;

    let buzzwords = tokenize_words(text)
        .iter()
        .filter(|t| BUZZWORDS.contains(&t.as_str()))
        .count() as f64;
    let buzzword_density = (buzzwords / n_words * 20.0).min(1.0);

    let generic = generic_res().iter().filter(|re| re.is_match(&lower)).count() as f64;
    let generic_phrases = (generic / n_sentences * 2.0).min(1.0);

    let contractions = contraction_re().find_iter(text).count() as f64;
    let contraction_absence = (1.0 - contractions / n_sentences * 2.0).max(0.0);

    let specifics =
        (number_re().find_iter(text).count() + proper_noun_re().find_iter(text).count()) as f64;
    let vagueness = (1.0 - specifics / n_words * 20.0).max(0.0);

    let length_uniformity = if sentences.len() > 1 {
        let lengths: Vec<f64> = sentences
            .iter()
            .map(|s| s.split_whitespace().count() as f64)
            .collect();
        let mean = lengths.iter().sum::<f64>() / n_sentences;
        let variance =
            lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / (n_sentences - 1.0);
        (1.0 - variance / 100.0).max(0.0)
    } else {
        1.0
    };

    let formality = (formal_re().find_iter(&lower).count() as f64 / n_sentences).min(1.0);

    // First use of a stock pattern is fine; each repeat counts
    let repeats: usize = repeated_res()
        .iter()
        .map(|re| re.find_iter(text).count())
        .filter(|&count| count > 1)
        .map(|count| count - 1)
        .sum();
    let repetition = (repeats as f64 / n_sentences.max(1.0)).min(1.0);

    Some(PatternFeatures {
        buzzword_density: round4(buzzword_density),
        generic_phrases: round4(generic_phrases),
        contraction_absence: round4(contraction_absence),
        vagueness: round4(vagueness),
        length_uniformity: round4(length_uniformity),
        formality: round4(formality),
        repetition: round4(repetition),
    })
}

/// Human-likeness from phrase patterns. Text without words or sentences is neutral.
pub fn pattern_score(text: &str) -> PatternScore {
    match pattern_features(text) {
        Some(features) => {
            let ai = features.ai_score();
            debug!("[PATTERNS] ai_score={:.3} features={:?}", ai, features);
            PatternScore {
                features,
                human_score: round4(1.0 - ai),
            }
        }
        None => PatternScore {
            features: PatternFeatures::default(),
            human_score: 0.5,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_neutral() {
        let s = pattern_score("   ");
        assert_eq!(s.human_score, 0.5);
        assert_eq!(s.features, PatternFeatures::default());
    }

    #[test]
    fn test_cover_letter_template_reads_as_ai() {
        let text = "I am writing to express my strong interest in this role. \
                    Furthermore, I have demonstrated exceptional proficiency throughout my career. \
                    Moreover, I am confident that I would be an excellent addition to your esteemed team.";
        let s = pattern_score(text);
        assert!(s.features.generic_phrases > 0.5);
        assert!(s.features.formality > 0.0);
        assert!(s.human_score < 0.5, "human_score = {}", s.human_score);
    }

    #[test]
    fn test_casual_specific_text_reads_as_human() {
        let text = "We didn't leave Boston until 9 on Tuesday. \
                    Sam's car broke down twice, so we're late. \
                    I'd rather walk next time, honestly.";
        let s = pattern_score(text);
        assert_eq!(s.features.contraction_absence, 0.0);
        assert_eq!(s.features.generic_phrases, 0.0);
        assert!(s.human_score > 0.7, "human_score = {}", s.human_score);
    }

    #[test]
    fn test_single_sentence_leans_uniform() {
        let f = pattern_features("Just one plain sentence here").unwrap();
        assert_eq!(f.length_uniformity, 1.0);
    }
}
