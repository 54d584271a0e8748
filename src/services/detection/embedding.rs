// Embedding Provider
// Lazily initialized sentence-embedding resource shared across requests

use futures::future::{try_join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::error::DetectionError;
use crate::services::config_store::EmbeddingConfig;
use crate::services::providers::ProviderClient;

const PROBE_TEXT: &str = "warm-up probe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingModelInfo {
    pub model: String,
    pub dimensions: usize,
}

/// A source of fixed-width text vectors.
pub trait EmbeddingBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// Prepare the model and report its shape. Called at most once per
    /// successful initialization.
    fn load(&self) -> BoxFuture<'_, Result<EmbeddingModelInfo, DetectionError>>;

    /// One vector per input, in input order.
    fn encode<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, DetectionError>>;
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingBackend {
    client: ProviderClient,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingBackend {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Self {
        Self {
            client: ProviderClient::new(Duration::from_secs(config.timeout_secs)),
            url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
        }
    }
}

impl EmbeddingBackend for HttpEmbeddingBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn load(&self) -> BoxFuture<'_, Result<EmbeddingModelInfo, DetectionError>> {
        Box::pin(async move {
            let probe = vec![PROBE_TEXT.to_string()];
            let vectors = self
                .client
                .embed(&self.url, &self.model, self.api_key.as_deref(), &probe)
                .await
                .map_err(|e| DetectionError::ModelLoad {
                    component: "embedding",
                    message: e.to_string(),
                })?;
            let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
            if dimensions == 0 {
                return Err(DetectionError::ModelLoad {
                    component: "embedding",
                    message: "endpoint returned an empty vector".to_string(),
                });
            }
            Ok(EmbeddingModelInfo {
                model: self.model.clone(),
                dimensions,
            })
        })
    }

    fn encode<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, DetectionError>> {
        Box::pin(async move {
            self.client
                .embed(&self.url, &self.model, self.api_key.as_deref(), texts)
                .await
                .map_err(|e| DetectionError::Embedding(e.to_string()))
        })
    }
}

/// Explicitly constructed, shareable handle around an [`EmbeddingBackend`].
///
/// The backend is loaded on first use. Concurrent first callers wait on the
/// same initialization; a failed load is not cached, so a later call retries.
pub struct EmbeddingHandle {
    backend: Arc<dyn EmbeddingBackend>,
    info: OnceCell<EmbeddingModelInfo>,
    batch_size: usize,
}

impl EmbeddingHandle {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            info: OnceCell::new(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn is_loaded(&self) -> bool {
        self.info.initialized()
    }

    pub async fn ensure_loaded(&self) -> Result<&EmbeddingModelInfo, DetectionError> {
        self.info
            .get_or_try_init(|| async {
                let start = Instant::now();
                info!("[EMBEDDING] Loading model {}", self.backend.model_name());
                match self.backend.load().await {
                    Ok(info) => {
                        info!(
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "[EMBEDDING] Model {} ready ({} dims)",
                            info.model,
                            info.dimensions
                        );
                        Ok(info)
                    }
                    Err(e) => {
                        warn!("[EMBEDDING] Model load failed: {}", e);
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Encode texts in batches; batches run concurrently and are recombined in order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DetectionError> {
        let info = self.ensure_loaded().await?;
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batches = texts
            .chunks(self.batch_size)
            .map(|batch| self.backend.encode(batch));
        let vectors: Vec<Vec<f32>> = try_join_all(batches).await?.into_iter().flatten().collect();

        if vectors.len() != texts.len() {
            return Err(DetectionError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != info.dimensions) {
            return Err(DetectionError::Embedding(format!(
                "expected {} dimensions, got {}",
                info.dimensions,
                bad.len()
            )));
        }
        Ok(vectors)
    }
}
