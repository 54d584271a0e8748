// Configuration Storage Service
// Handles config file read/write, validation and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::detection::style_scorer::StyleWeights;
use super::providers::{
    CLASSIFIER_DEFAULT_MODEL, CLASSIFIER_DEFAULT_URL, EMBEDDING_DEFAULT_MODEL,
    EMBEDDING_DEFAULT_URL, GROQ_DEFAULT_MODEL, GROQ_DEFAULT_URL,
};

const BACKUPS_TO_KEEP: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What to do with input longer than `max_text_length` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    #[default]
    Reject,
    Truncate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    #[serde(default)]
    pub oversize_policy: OversizePolicy,
    #[serde(default = "default_num_chunks")]
    pub num_chunks: usize,
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub style_weights: StyleWeights,
    /// Zone calibration JSON; the compiled-in reference calibration is used when absent.
    #[serde(default)]
    pub calibration_path: Option<PathBuf>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            max_text_length: default_max_text_length(),
            oversize_policy: OversizePolicy::default(),
            num_chunks: default_num_chunks(),
            arbitration: ArbitrationConfig::default(),
            embedding: EmbeddingConfig::default(),
            classifier: ClassifierConfig::default(),
            style_weights: StyleWeights::default(),
            calibration_path: None,
            api_keys: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load-time validation; a config that fails here never reaches the detector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.style_weights.validate()?;

        if self.max_text_length == 0 {
            return Err(ConfigError::Invalid("maxTextLength must be at least 1".into()));
        }
        if self.num_chunks == 0 {
            return Err(ConfigError::Invalid("numChunks must be at least 1".into()));
        }
        if self.arbitration.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "arbitration.maxConcurrency must be at least 1".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batchSize must be at least 1".into()));
        }
        for (name, secs) in [
            ("arbitration", self.arbitration.timeout_secs),
            ("embedding", self.embedding.timeout_secs),
            ("classifier", self.classifier.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{}.timeoutSecs must be positive", name)));
            }
        }
        if !(0.0..=2.0).contains(&self.arbitration.temperature) {
            return Err(ConfigError::Invalid(
                "arbitration.temperature must be within [0, 2]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_groq_url")]
    pub base_url: String,
    #[serde(default = "default_groq_model")]
    pub model: String,
    #[serde(default = "default_arbitration_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_groq_url(),
            model: default_groq_model(),
            timeout_secs: default_arbitration_timeout(),
            max_concurrency: default_concurrency(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_classifier_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_classifier_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_version() -> String { "1.0.0".to_string() }
fn default_true() -> bool { true }
fn default_max_text_length() -> usize { 10_000 }
fn default_num_chunks() -> usize { 50 }
fn default_groq_url() -> String { GROQ_DEFAULT_URL.to_string() }
fn default_groq_model() -> String { GROQ_DEFAULT_MODEL.to_string() }
fn default_arbitration_timeout() -> u64 { 30 }
fn default_concurrency() -> usize { 4 }
fn default_temperature() -> f64 { 0.1 }
fn default_max_tokens() -> u32 { 200 }
fn default_embedding_url() -> String { EMBEDDING_DEFAULT_URL.to_string() }
fn default_embedding_model() -> String { EMBEDDING_DEFAULT_MODEL.to_string() }
fn default_embedding_timeout() -> u64 { 60 }
fn default_batch_size() -> usize { 16 }
fn default_classifier_url() -> String { CLASSIFIER_DEFAULT_URL.to_string() }
fn default_classifier_model() -> String { CLASSIFIER_DEFAULT_MODEL.to_string() }
fn default_classifier_timeout() -> u64 { 20 }

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("text-spotter"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(|e| ConfigError::io(&self.config_dir, e))
    }

    /// Load and validate configuration; a missing file yields defaults
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| ConfigError::io(&self.config_file, e))?;

        let config: AppConfig = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            what: self.config_file.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Parse {
            what: "config".to_string(),
            source: e,
        })?;

        fs::write(&self.config_file, content).map_err(|e| ConfigError::io(&self.config_file, e))
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(|e| ConfigError::io(&backup_dir, e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(|e| ConfigError::io(&backup_file, e))?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_TO_KEEP)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| ConfigError::io(backup_dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, provider: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}
