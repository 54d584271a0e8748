// Test stubs for the backend traits

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::arbitrator::JudgeBackend;
use super::classifier::{ClassProbabilities, ClassifierBackend};
use super::embedding::{EmbeddingBackend, EmbeddingModelInfo};
use super::error::DetectionError;
use crate::services::providers::ProviderError;

/// Deterministic vectors: component `j` of a text's vector is
/// `char_count / (j + 1)`.
pub struct StubEmbedding {
    dims: usize,
    load_delay: Duration,
    failures_left: AtomicUsize,
    fail_encode: bool,
    pub loads: AtomicUsize,
    pub encode_calls: AtomicUsize,
}

impl StubEmbedding {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            load_delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            fail_encode: false,
            loads: AtomicUsize::new(0),
            encode_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing_loads(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_encode(mut self) -> Self {
        self.fail_encode = true;
        self
    }
}

impl EmbeddingBackend for StubEmbedding {
    fn model_name(&self) -> &str {
        "stub-embedding"
    }

    fn load(&self) -> BoxFuture<'_, Result<EmbeddingModelInfo, DetectionError>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.load_delay.is_zero() {
                tokio::time::sleep(self.load_delay).await;
            }
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(DetectionError::ModelLoad {
                    component: "embedding",
                    message: "stub load failure".to_string(),
                });
            }
            Ok(EmbeddingModelInfo {
                model: "stub-embedding".to_string(),
                dimensions: self.dims,
            })
        })
    }

    fn encode<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, DetectionError>> {
        Box::pin(async move {
            self.encode_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_encode {
                return Err(DetectionError::Embedding("stub encode failure".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let len = t.chars().count() as f32;
                    (0..self.dims).map(|j| len / (j + 1) as f32).collect()
                })
                .collect())
        })
    }
}

pub struct StubClassifier {
    human: Option<f64>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl StubClassifier {
    pub fn answering(human: f64) -> Self {
        Self {
            human: Some(human),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            human: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ClassifierBackend for StubClassifier {
    fn model_name(&self) -> &str {
        "stub-classifier"
    }

    fn classify<'a>(
        &'a self,
        _text: &'a str,
    ) -> BoxFuture<'a, Result<ClassProbabilities, ProviderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.human {
                Some(human) => Ok(ClassProbabilities {
                    human,
                    ai: 1.0 - human,
                }),
                None => Err(ProviderError::ApiError {
                    status: 503,
                    message: "stub unavailable".to_string(),
                }),
            }
        })
    }
}

pub struct StubJudge {
    reply: Option<String>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl StubJudge {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl JudgeBackend for StubJudge {
    fn model_name(&self) -> &str {
        "stub-judge"
    }

    fn complete<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().ok_or(ProviderError::ApiError {
                status: 500,
                message: "stub judge failure".to_string(),
            })
        })
    }
}
