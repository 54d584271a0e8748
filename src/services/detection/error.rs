// Detection Errors
// Request-level failures; external judge/classifier failures never appear here

use thiserror::Error;

use crate::services::config_store::ConfigError;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Input text is empty")]
    EmptyInput,
    #[error("Input text has {length} characters; the limit is {limit}")]
    TextTooLong { length: usize, limit: usize },
    #[error("No sentences found after segmentation")]
    NoSentences,
    #[error("Failed to load {component}: {message}")]
    ModelLoad {
        component: &'static str,
        message: String,
    },
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DetectionError {
    /// Caller-side problems with the submitted text; never worth retrying.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::TextTooLong { .. } | Self::NoSentences
        )
    }
}
