// Text Spotter Data Models
// Request/response DTOs shared by the library and the CLI

use serde::{Deserialize, Serialize};

pub use crate::services::detection::arbitrator::{ArbitrationMode, FallbackReason};
pub use crate::services::detection::style_scorer::FeatureVector;
pub use crate::services::detection::zones::ZoneLabel;

// ============ Classification ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Human,
    Suspicious,
    Ai,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Human => "human",
            Classification::Suspicious => "suspicious",
            Classification::Ai => "ai",
        }
    }

    /// Case-insensitive; `None` for anything outside the three labels.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" => Some(Classification::Human),
            "suspicious" => Some(Classification::Suspicious),
            "ai" => Some(Classification::Ai),
            _ => None,
        }
    }
}

// ============ Analyze Request ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub text: String,
    /// Pre-segmented sentences; when present, `text` is not re-segmented
    #[serde(default)]
    pub sentences: Option<Vec<String>>,
    #[serde(default)]
    pub num_chunks: Option<usize>,
    #[serde(default = "default_true")]
    pub use_embedding: bool,
    #[serde(default = "default_true")]
    pub use_arbitration: bool,
}

impl AnalyzeRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sentences: None,
            num_chunks: None,
            use_embedding: true,
            use_arbitration: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============ Analyze Response ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceScores {
    pub style: f64,
    pub patterns: f64,
    pub classifier: Option<f64>,
    /// Document-level zone soft score shared by every sentence
    pub variability: Option<f64>,
    pub arbitration_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceResult {
    pub index: usize,
    pub text: String,
    pub classification: Classification,
    pub confidence: f64,
    pub scores: SentenceScores,
    pub reasoning: String,
    pub features: FeatureVector,
    pub arbitration: ArbitrationMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_sentences: usize,
    pub human_count: usize,
    pub suspicious_count: usize,
    pub ai_count: usize,
    pub human_percentage: f64,
    pub suspicious_percentage: f64,
    pub ai_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVerdict {
    pub spread: f64,
    pub zone: u8,
    pub label: ZoneLabel,
    pub confidence: f64,
    pub soft_score: f64,
    pub chunk_count: usize,
    pub calibration_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub request_id: String,
    pub version: String,
    pub sentences: Vec<SentenceResult>,
    pub overall_stats: OverallStats,
    pub document: Option<DocumentVerdict>,
    pub truncated: bool,
    pub latency_ms: u64,
}

// ============ Health ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub segmenter: bool,
    pub style: bool,
    pub patterns: bool,
    pub embedding: bool,
    pub classifier: bool,
    pub arbitration: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub components: ComponentHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_parse() {
        assert_eq!(Classification::parse(" AI "), Some(Classification::Ai));
        assert_eq!(Classification::parse("Human"), Some(Classification::Human));
        assert_eq!(Classification::parse("maybe"), None);
    }

    #[test]
    fn test_request_defaults() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert!(req.use_embedding);
        assert!(req.use_arbitration);
        assert!(req.sentences.is_none());
        assert!(req.num_chunks.is_none());
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(OverallStats::default()).unwrap();
        assert!(json.get("humanPercentage").is_some());
        assert!(json.get("totalSentences").is_some());
    }
}
