// Detection Module
// Provenance scoring organized into specialized submodules:
// - style_scorer: per-sentence statistical style features
// - ai_patterns: stock-phrase and formality markers
// - embedding / variability / zones: document spread and its calibrated zone
// - classifier: optional hosted sequence classifier
// - arbitrator: external judge with local fallback voting
// - aggregation: document summary statistics
// - pipeline: end-to-end orchestration

pub mod error;
pub mod style_scorer;
pub mod ai_patterns;
pub mod embedding;
pub mod variability;
pub mod zones;
pub mod classifier;
pub mod arbitrator;
pub mod aggregation;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use error::DetectionError;
pub use style_scorer::{FeatureVector, StyleScorer, StyleWeights};
pub use ai_patterns::{pattern_score, PatternFeatures, PatternScore};
pub use embedding::{EmbeddingBackend, EmbeddingHandle, EmbeddingModelInfo, HttpEmbeddingBackend};
pub use variability::{chunk_sentences, mean_vector_spread, measure_variability, Chunk, VariabilityReport};
pub use zones::{SpreadDirection, ZoneCalibration, ZoneLabel, ZoneResult, ZoneThresholds};
pub use classifier::{ClassProbabilities, ClassifierBackend, ClassifierScore, HttpClassifierBackend, LearnedClassifier};
pub use arbitrator::{
    decide_fallback,
    ArbitrationDecision,
    ArbitrationMode,
    Arbitrator,
    EvidenceScores,
    FallbackReason,
    GroqJudge,
    JudgeBackend,
    Signal,
};
pub use aggregation::summarize;
pub use pipeline::{Backends, Detector};
