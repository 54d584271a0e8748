// Text Processing Service
// Whitespace normalization, abbreviation-aware sentence splitting and tokenization

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Sentences with fewer whitespace-separated words than this are treated as noise.
pub const MIN_SENTENCE_WORDS: usize = 3;

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "vs", "etc", "inc", "ltd", "corp", "co", "st",
    "ave", "blvd", "dept", "univ", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "oct",
    "nov", "dec", "mon", "tue", "wed", "thu", "fri", "sat", "sun", "no", "vol", "fig", "ed", "est",
    "approx",
];

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn abbreviation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = ABBREVIATIONS.join("|");
        Regex::new(&format!(r"(?i)\b(?:{})\.", alternation)).expect("static regex")
    })
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub index: usize,
    pub text: String,
    /// Byte offsets into the preprocessed text
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceContext {
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn preprocess(text: &str) -> String {
    whitespace_re().replace_all(text, " ").trim().to_string()
}

/// Maximal alphanumeric runs, case-folded.
pub fn tokenize_words(text: &str) -> Vec<String> {
    word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Truncate to at most `max_chars` characters without splitting a code point.
/// Returns the (possibly shortened) text and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Byte positions of periods that terminate a known abbreviation.
fn protected_periods(text: &str) -> HashSet<usize> {
    abbreviation_re()
        .find_iter(text)
        .map(|m| m.end() - 1)
        .collect()
}

/// Split preprocessed text at `.`, `!` or `?` followed by a space and an
/// uppercase ASCII letter. Returns raw byte ranges.
fn boundary_ranges(text: &str, protected: &HashSet<usize>) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut start = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if !matches!(b, b'.' | b'!' | b'?') || protected.contains(&i) {
            continue;
        }
        let followed_by_capital = bytes.get(i + 1) == Some(&b' ')
            && bytes.get(i + 2).is_some_and(|c| c.is_ascii_uppercase());
        if followed_by_capital {
            ranges.push((start, i + 1));
            start = i + 2;
        }
    }
    if start < text.len() {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Split free text into ordered sentences.
///
/// Whitespace is normalized first, so offsets refer to `preprocess(text)`.
/// Fragments with fewer than [`MIN_SENTENCE_WORDS`] words are dropped and the
/// surviving sentences are re-indexed from zero.
pub fn segment(text: &str) -> Vec<Sentence> {
    let normalized = preprocess(text);
    if normalized.is_empty() {
        return vec![];
    }

    let protected = protected_periods(&normalized);

    boundary_ranges(&normalized, &protected)
        .into_iter()
        .filter_map(|(start, end)| {
            let raw = &normalized[start..end];
            let trimmed = raw.trim();
            if trimmed.split_whitespace().count() < MIN_SENTENCE_WORDS {
                return None;
            }
            let lead = raw.len() - raw.trim_start().len();
            let s = start + lead;
            Some((s, s + trimmed.len(), trimmed.to_string()))
        })
        .enumerate()
        .map(|(index, (start, end, text))| Sentence {
            index,
            text,
            start,
            end,
        })
        .collect()
}

/// Neighbouring sentences, if any.
pub fn extract_context(sentences: &[Sentence], index: usize) -> SentenceContext {
    let before = index
        .checked_sub(1)
        .and_then(|i| sentences.get(i))
        .map(|s| s.text.clone());
    let after = sentences.get(index + 1).map(|s| s.text.clone());
    SentenceContext { before, after }
}
