// Learned Classifier
// Optional hosted sequence classifier used as an extra human-likeness signal

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::arbitrator::Signal;
use super::error::DetectionError;
use super::style_scorer::round4;
use crate::services::config_store::ClassifierConfig;
use crate::services::providers::{LabelScore, ProviderClient, ProviderError};

const SCORE_OFFSET: f64 = 0.03;
const CONFIDENCE_SCALE: f64 = 0.7;
const PROBE_TEXT: &str = "This is a short warm-up sentence.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProbabilities {
    pub human: f64,
    pub ai: f64,
}

impl ClassProbabilities {
    /// Pick out the human-class probability from labeled scores. Labels that
    /// do not mention "human" count towards the AI class.
    pub fn from_labels(labels: &[LabelScore]) -> Option<Self> {
        let human = labels
            .iter()
            .find(|l| l.label.to_lowercase().contains("human"))
            .map(|l| l.score);
        let ai = labels
            .iter()
            .filter(|l| !l.label.to_lowercase().contains("human"))
            .map(|l| l.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

        match (human, ai) {
            (Some(h), Some(a)) => Some(Self { human: h, ai: a }),
            (Some(h), None) => Some(Self { human: h, ai: 1.0 - h }),
            (None, Some(a)) => Some(Self { human: 1.0 - a, ai: a }),
            (None, None) => None,
        }
        .map(|p| Self {
            human: p.human.clamp(0.0, 1.0),
            ai: p.ai.clamp(0.0, 1.0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierScore {
    /// Human-likeness after the calibration offset
    pub score: f64,
    pub confidence: f64,
}

impl ClassifierScore {
    pub fn from_probabilities(p: ClassProbabilities) -> Self {
        Self {
            score: round4((p.human - SCORE_OFFSET).max(0.0)),
            confidence: round4(p.human.max(p.ai) * CONFIDENCE_SCALE),
        }
    }
}

pub trait ClassifierBackend: Send + Sync {
    fn model_name(&self) -> &str;

    fn classify<'a>(&'a self, text: &'a str)
        -> BoxFuture<'a, Result<ClassProbabilities, ProviderError>>;
}

/// Hosted text-classification endpoint (`{"inputs": text}` in, labeled scores out).
pub struct HttpClassifierBackend {
    client: ProviderClient,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpClassifierBackend {
    pub fn new(config: &ClassifierConfig, api_key: Option<String>) -> Self {
        Self {
            client: ProviderClient::new(Duration::from_secs(config.timeout_secs)),
            url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
        }
    }
}

impl ClassifierBackend for HttpClassifierBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn classify<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<ClassProbabilities, ProviderError>> {
        Box::pin(async move {
            let labels = self
                .client
                .classify_text(&self.url, self.api_key.as_deref(), text)
                .await?;
            ClassProbabilities::from_labels(&labels).ok_or(ProviderError::MissingContent)
        })
    }
}

/// Readiness-tracking wrapper. The first successful probe marks the backend
/// loaded; scoring failures after that degrade to [`Signal::Unavailable`].
pub struct LearnedClassifier {
    backend: Arc<dyn ClassifierBackend>,
    ready: OnceCell<()>,
    timeout: Duration,
}

impl LearnedClassifier {
    pub fn new(backend: Arc<dyn ClassifierBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            ready: OnceCell::new(),
            timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn is_loaded(&self) -> bool {
        self.ready.initialized()
    }

    pub async fn ensure_loaded(&self) -> Result<(), DetectionError> {
        self.ready
            .get_or_try_init(|| async {
                info!("[CLASSIFIER] Probing {}", self.backend.model_name());
                match tokio::time::timeout(self.timeout, self.backend.classify(PROBE_TEXT)).await {
                    Ok(Ok(_)) => {
                        info!("[CLASSIFIER] {} ready", self.backend.model_name());
                        Ok(())
                    }
                    Ok(Err(e)) => Err(DetectionError::ModelLoad {
                        component: "classifier",
                        message: e.to_string(),
                    }),
                    Err(_) => Err(DetectionError::ModelLoad {
                        component: "classifier",
                        message: format!("probe timed out after {:?}", self.timeout),
                    }),
                }
            })
            .await
            .copied()
    }

    pub async fn score(&self, text: &str) -> Option<ClassifierScore> {
        if text.trim().is_empty() {
            return None;
        }
        if let Err(e) = self.ensure_loaded().await {
            warn!("[CLASSIFIER] Unavailable: {}", e);
            return None;
        }

        match tokio::time::timeout(self.timeout, self.backend.classify(text)).await {
            Ok(Ok(probs)) => {
                let score = ClassifierScore::from_probabilities(probs);
                debug!(
                    "[CLASSIFIER] human={:.4} ai={:.4} score={:.4}",
                    probs.human, probs.ai, score.score
                );
                Some(score)
            }
            Ok(Err(e)) => {
                warn!("[CLASSIFIER] Request failed: {}", e);
                None
            }
            Err(_) => {
                warn!("[CLASSIFIER] Timed out after {:?}", self.timeout);
                None
            }
        }
    }

    pub async fn signal(&self, text: &str) -> Signal {
        self.score(text)
            .await
            .map_or(Signal::Unavailable, |s| Signal::Scored(s.score))
    }
}
