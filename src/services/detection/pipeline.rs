// Detection Pipeline
// End-to-end orchestration: segmentation, local scoring, document spread,
// concurrency-limited external calls and summary statistics

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::ai_patterns::pattern_score;
use super::arbitrator::{
    ArbitrationDecision, Arbitrator, EvidenceScores, FallbackReason, GroqJudge, JudgeBackend,
    Signal,
};
use super::classifier::{ClassifierBackend, HttpClassifierBackend, LearnedClassifier};
use super::embedding::{EmbeddingBackend, EmbeddingHandle, HttpEmbeddingBackend};
use super::error::DetectionError;
use super::style_scorer::{FeatureVector, StyleScorer};
use super::variability::{measure_variability, VariabilityReport};
use super::zones::{ZoneLabel, ZoneThresholds};
use super::aggregation::summarize_results;
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, ComponentHealth, DocumentVerdict, HealthReport,
    HealthStatus, SentenceResult, SentenceScores,
};
use crate::services::config_store::{AppConfig, OversizePolicy};
use crate::services::providers::resolve_api_key;
use crate::services::text_processor::{
    extract_context, preprocess, segment, truncate_chars, Sentence, SentenceContext,
};

/// Externally backed capabilities. `None` disables the capability.
#[derive(Default, Clone)]
pub struct Backends {
    pub embedding: Option<Arc<dyn EmbeddingBackend>>,
    pub classifier: Option<Arc<dyn ClassifierBackend>>,
    pub judge: Option<Arc<dyn JudgeBackend>>,
}

impl Backends {
    /// HTTP backends for every capability enabled in `config` that has what it needs.
    pub fn from_config(config: &AppConfig) -> Self {
        let embedding = config.embedding.enabled.then(|| {
            Arc::new(HttpEmbeddingBackend::new(
                &config.embedding,
                resolve_api_key("embedding", config),
            )) as Arc<dyn EmbeddingBackend>
        });

        let classifier = config.classifier.enabled.then(|| {
            Arc::new(HttpClassifierBackend::new(
                &config.classifier,
                resolve_api_key("huggingface", config),
            )) as Arc<dyn ClassifierBackend>
        });

        let judge = if config.arbitration.enabled {
            match resolve_api_key("groq", config) {
                Some(key) => Some(Arc::new(GroqJudge::new(&config.arbitration, key))
                    as Arc<dyn JudgeBackend>),
                None => {
                    warn!("[PIPELINE] Groq API key NOT found, arbitration will use fallback voting");
                    None
                }
            }
        } else {
            None
        };

        Self {
            embedding,
            classifier,
            judge,
        }
    }
}

struct DetectorInner {
    config: AppConfig,
    style: StyleScorer,
    thresholds: ZoneThresholds,
    embedding: Option<EmbeddingHandle>,
    classifier: Option<LearnedClassifier>,
    arbitrator: Arbitrator,
}

/// Cheap to clone; all shared state is read-only or once-initialized.
#[derive(Clone)]
pub struct Detector {
    inner: Arc<DetectorInner>,
}

/// Locally computed evidence for one sentence, before any network call.
#[derive(Clone)]
struct LocalScores {
    sentence: Sentence,
    context: SentenceContext,
    features: FeatureVector,
    patterns: f64,
}

impl Detector {
    /// Build from configuration with HTTP backends. Loads the zone calibration
    /// from `calibrationPath` when set.
    pub fn from_config(config: AppConfig) -> Result<Self, DetectionError> {
        config.validate()?;
        let thresholds = match &config.calibration_path {
            Some(path) => ZoneThresholds::load_file(path)?,
            None => ZoneThresholds::default(),
        };
        let backends = Backends::from_config(&config);
        Self::with_backends(config, thresholds, backends)
    }

    pub fn with_backends(
        config: AppConfig,
        thresholds: ZoneThresholds,
        backends: Backends,
    ) -> Result<Self, DetectionError> {
        config.validate()?;
        thresholds.validate()?;

        let embedding = backends
            .embedding
            .map(|b| EmbeddingHandle::new(b, config.embedding.batch_size));
        let classifier = backends.classifier.map(|b| {
            LearnedClassifier::new(b, Duration::from_secs(config.classifier.timeout_secs))
        });
        let arbitrator = Arbitrator::new(
            backends.judge,
            Duration::from_secs(config.arbitration.timeout_secs),
        );

        info!(
            "[PIPELINE] Detector ready: calibration={}, embedding={}, classifier={}, arbitration={}",
            thresholds.version,
            embedding.as_ref().map_or("disabled", |e| e.model_name()),
            classifier.as_ref().map_or("disabled", |c| c.model_name()),
            arbitrator.model_name().unwrap_or("fallback")
        );

        Ok(Self {
            inner: Arc::new(DetectorInner {
                style: StyleScorer::new(config.style_weights),
                config,
                thresholds,
                embedding,
                classifier,
                arbitrator,
            }),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn thresholds(&self) -> &ZoneThresholds {
        &self.inner.thresholds
    }

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, DetectionError> {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let inner = &self.inner;

        let (sentences, truncated) = self.prepare_sentences(&request)?;
        info!(
            "[PIPELINE] Request {}: {} sentences (truncated={})",
            request_id,
            sentences.len(),
            truncated
        );

        let num_chunks = request.num_chunks.unwrap_or(inner.config.num_chunks).max(1);
        let document = if request.use_embedding {
            self.document_verdict(&sentences, num_chunks).await
        } else {
            None
        };
        let variability = Signal::from(document.as_ref().map(|d| d.soft_score));
        let zone = document.as_ref().map(|d| d.label);

        let locals: Vec<LocalScores> = sentences
            .iter()
            .map(|s| self.score_locally(s, &sentences))
            .collect();

        let use_judge = request.use_arbitration && inner.arbitrator.is_configured();
        let use_classifier = self.classifier_ready().await;
        let needs_network = use_judge || use_classifier;

        let mut results: Vec<SentenceResult> = if needs_network {
            self.score_remotely(locals, variability, zone, use_judge, use_classifier)
                .await
        } else {
            locals
                .into_iter()
                .map(|local| {
                    let evidence = evidence_for(&local, Signal::Unavailable, variability, zone);
                    let decision = Arbitrator::fallback(&evidence, FallbackReason::NotConfigured);
                    build_result(local, &evidence, decision)
                })
                .collect()
        };
        results.sort_by_key(|r| r.index);

        let overall_stats = summarize_results(&results);
        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            elapsed_ms = latency_ms,
            "[PIPELINE] Request {} done: human={} suspicious={} ai={}",
            request_id,
            overall_stats.human_count,
            overall_stats.suspicious_count,
            overall_stats.ai_count
        );

        Ok(AnalyzeResponse {
            request_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            sentences: results,
            overall_stats,
            document,
            truncated,
            latency_ms,
        })
    }

    /// Normalize, length-check and segment the request text.
    fn prepare_sentences(
        &self,
        request: &AnalyzeRequest,
    ) -> Result<(Vec<Sentence>, bool), DetectionError> {
        let config = &self.inner.config;

        let (text, presegmented) = match &request.sentences {
            Some(list) => {
                let cleaned: Vec<String> = list
                    .iter()
                    .map(|s| preprocess(s))
                    .filter(|s| !s.is_empty())
                    .collect();
                (cleaned.join(" "), Some(cleaned))
            }
            None => (preprocess(&request.text), None),
        };
        if text.is_empty() {
            return Err(DetectionError::EmptyInput);
        }

        let length = text.chars().count();
        let (text, truncated) = if length > config.max_text_length {
            match config.oversize_policy {
                OversizePolicy::Reject => {
                    return Err(DetectionError::TextTooLong {
                        length,
                        limit: config.max_text_length,
                    })
                }
                OversizePolicy::Truncate => {
                    let (cut, _) = truncate_chars(&text, config.max_text_length);
                    warn!(
                        "[PIPELINE] Input truncated from {} to {} characters",
                        length, config.max_text_length
                    );
                    (cut.to_string(), true)
                }
            }
        } else {
            (text, false)
        };

        let sentences = match presegmented {
            Some(list) => sentences_from_list(list, text.len()),
            None => segment(&text),
        };
        if sentences.is_empty() {
            return Err(DetectionError::NoSentences);
        }
        Ok((sentences, truncated))
    }

    fn score_locally(&self, sentence: &Sentence, all: &[Sentence]) -> LocalScores {
        let context = extract_context(all, sentence.index);
        let features = self.inner.style.score(&sentence.text);

        let mut window = String::new();
        for part in [context.before.as_deref(), Some(sentence.text.as_str()), context.after.as_deref()]
            .into_iter()
            .flatten()
        {
            if !window.is_empty() {
                window.push(' ');
            }
            window.push_str(part);
        }
        let patterns = pattern_score(&window).human_score;

        LocalScores {
            sentence: sentence.clone(),
            context,
            features,
            patterns,
        }
    }

    /// Probe the classifier once per request; a failed probe drops the signal
    /// for every sentence instead of being retried inside each task.
    async fn classifier_ready(&self) -> bool {
        let Some(classifier) = &self.inner.classifier else {
            return false;
        };
        match classifier.ensure_loaded().await {
            Ok(()) => true,
            Err(e) => {
                warn!("[PIPELINE] Classifier unavailable for this request: {}", e);
                false
            }
        }
    }

    /// Spread-based document verdict. Embedding failures degrade to `None`.
    async fn document_verdict(
        &self,
        sentences: &[Sentence],
        num_chunks: usize,
    ) -> Option<DocumentVerdict> {
        let handle = self.inner.embedding.as_ref()?;
        match measure_variability(handle, sentences, num_chunks).await {
            Ok(VariabilityReport {
                spread,
                chunk_count,
            }) => {
                let zone = self.inner.thresholds.classify(spread);
                debug!(
                    "[PIPELINE] spread={:.6} zone={} ({})",
                    spread,
                    zone.zone,
                    zone.label.as_str()
                );
                Some(DocumentVerdict {
                    spread,
                    zone: zone.zone,
                    label: zone.label,
                    confidence: zone.confidence,
                    soft_score: zone.soft_score,
                    chunk_count,
                    calibration_version: self.inner.thresholds.version.clone(),
                })
            }
            Err(e) => {
                warn!("[PIPELINE] Document variability unavailable: {}", e);
                None
            }
        }
    }

    /// Classifier + judge calls, one task per sentence, bounded by a semaphore.
    /// A task that dies is replaced by its precomputed fallback result.
    async fn score_remotely(
        &self,
        locals: Vec<LocalScores>,
        variability: Signal,
        zone: Option<ZoneLabel>,
        use_judge: bool,
        use_classifier: bool,
    ) -> Vec<SentenceResult> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.inner.config.arbitration.max_concurrency));
        let mut fallbacks: Vec<Option<SentenceResult>> = Vec::with_capacity(locals.len());
        let mut join_set: JoinSet<SentenceResult> = JoinSet::new();
        let total = locals.len();

        for local in locals {
            let evidence = evidence_for(&local, Signal::Unavailable, variability, zone);
            let reason = if use_judge {
                FallbackReason::Transport
            } else {
                FallbackReason::NotConfigured
            };
            let decision = Arbitrator::fallback(&evidence, reason);
            fallbacks.push(Some(build_result(local.clone(), &evidence, decision)));

            let inner = self.inner.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                // Permit covers only the network calls
                let permit = semaphore.acquire().await.ok();

                let classifier = match &inner.classifier {
                    Some(c) if use_classifier => c.signal(&local.sentence.text).await,
                    _ => Signal::Unavailable,
                };
                let evidence = evidence_for(&local, classifier, variability, zone);
                let decision = if use_judge {
                    inner
                        .arbitrator
                        .decide(&local.sentence.text, &local.context, &evidence)
                        .await
                } else {
                    Arbitrator::fallback(&evidence, FallbackReason::NotConfigured)
                };
                drop(permit);

                build_result(local, &evidence, decision)
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut done = 0usize;
        while let Some(res) = join_set.join_next().await {
            done += 1;
            if done == total || done % 10 == 0 {
                debug!(
                    "[PIPELINE] Remote scoring progress: {}/{} (elapsed_ms={})",
                    done,
                    total,
                    started.elapsed().as_millis()
                );
            }
            match res {
                Ok(result) => {
                    if let Some(slot) = fallbacks.get_mut(result.index) {
                        *slot = None;
                    }
                    results.push(result);
                }
                Err(e) => warn!("[PIPELINE] Sentence task failed: {}", e),
            }
        }
        results.extend(fallbacks.into_iter().flatten());
        results
    }

    pub fn health(&self) -> HealthReport {
        let inner = &self.inner;
        let embedding = inner.embedding.as_ref().is_some_and(|e| e.is_loaded());
        let classifier = inner.classifier.as_ref().is_some_and(|c| c.is_loaded());
        let arbitration = inner.arbitrator.is_configured();

        let degraded = (inner.embedding.is_some() && !embedding)
            || (inner.classifier.is_some() && !classifier)
            || (inner.config.arbitration.enabled && !arbitration);

        HealthReport {
            status: if degraded {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            components: ComponentHealth {
                segmenter: true,
                style: true,
                patterns: true,
                embedding,
                classifier,
                arbitration,
            },
        }
    }

    /// Load the lazily initialized backends now rather than on first request.
    pub async fn warm_up(&self) -> HealthReport {
        let inner = &self.inner;
        if let Some(handle) = &inner.embedding {
            if let Err(e) = handle.ensure_loaded().await {
                warn!("[PIPELINE] Embedding warm-up failed: {}", e);
            }
        }
        if let Some(classifier) = &inner.classifier {
            if let Err(e) = classifier.ensure_loaded().await {
                warn!("[PIPELINE] Classifier warm-up failed: {}", e);
            }
        }
        self.health()
    }

    /// Spread of one document, for building calibration corpora.
    pub async fn measure_spread(
        &self,
        text: &str,
        num_chunks: usize,
    ) -> Result<VariabilityReport, DetectionError> {
        let handle = self.inner.embedding.as_ref().ok_or(DetectionError::ModelLoad {
            component: "embedding",
            message: "embedding capability is disabled".to_string(),
        })?;
        let sentences = segment(text);
        if sentences.is_empty() {
            return Err(DetectionError::NoSentences);
        }
        measure_variability(handle, &sentences, num_chunks).await
    }

    pub async fn embedding_model(&self) -> Result<(String, usize), DetectionError> {
        let handle = self.inner.embedding.as_ref().ok_or(DetectionError::ModelLoad {
            component: "embedding",
            message: "embedding capability is disabled".to_string(),
        })?;
        let info = handle.ensure_loaded().await?;
        Ok((info.model.clone(), info.dimensions))
    }
}

/// Sentences from a caller-provided list, with offsets into the space-joined
/// text. Sentences reaching past `limit` bytes are dropped.
fn sentences_from_list(list: Vec<String>, limit: usize) -> Vec<Sentence> {
    let mut offset = 0;
    let mut out = Vec::new();
    for text in list {
        let start = offset;
        let end = start + text.len();
        offset = end + 1;
        if end > limit {
            break;
        }
        out.push(Sentence {
            index: out.len(),
            text,
            start,
            end,
        });
    }
    out
}

fn evidence_for(
    local: &LocalScores,
    classifier: Signal,
    variability: Signal,
    zone: Option<ZoneLabel>,
) -> EvidenceScores {
    EvidenceScores {
        style: local.features.score,
        style_features: local.features,
        patterns: local.patterns,
        classifier,
        variability,
        zone,
    }
}

fn build_result(
    local: LocalScores,
    evidence: &EvidenceScores,
    decision: ArbitrationDecision,
) -> SentenceResult {
    SentenceResult {
        index: local.sentence.index,
        text: local.sentence.text,
        classification: decision.classification,
        confidence: decision.confidence,
        scores: SentenceScores {
            style: evidence.style,
            patterns: evidence.patterns,
            classifier: evidence.classifier.value(),
            variability: evidence.variability.value(),
            arbitration_confidence: decision.confidence,
        },
        reasoning: decision.reasoning,
        features: local.features,
        arbitration: decision.mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArbitrationMode, Classification};
    use crate::services::detection::test_support::{StubClassifier, StubEmbedding, StubJudge};
    use crate::services::providers::ProviderError;
    use futures::future::BoxFuture;
    use std::sync::atomic::Ordering;

    const THREE: &str = "The committee met on Tuesday to review the budget. \
                         Several members raised concerns about rising costs. \
                         A final vote was postponed until next month.";

    fn numbered(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} reads fine.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Answers slower for earlier sentences, so tasks finish in reverse order.
    struct IndexedJudge {
        total: usize,
        panic_on: Option<usize>,
    }

    fn sentence_number(prompt: &str) -> usize {
        prompt
            .lines()
            .find_map(|l| l.strip_prefix("Sentence: \"Sentence number "))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse().ok())
            .unwrap()
    }

    impl JudgeBackend for IndexedJudge {
        fn model_name(&self) -> &str {
            "indexed-judge"
        }

        fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
            Box::pin(async move {
                let i = sentence_number(prompt);
                if self.panic_on == Some(i) {
                    panic!("judge crashed on sentence {}", i);
                }
                let wait = (self.total - i) as u64 * 25;
                tokio::time::sleep(Duration::from_millis(wait)).await;
                Ok(format!(
                    r#"{{"classification": "human", "confidence": 0.9, "reasoning": "sentence {}"}}"#,
                    i
                ))
            })
        }
    }

    fn detector(backends: Backends) -> Detector {
        Detector::with_backends(AppConfig::default(), ZoneThresholds::default(), backends).unwrap()
    }

    fn offline() -> Detector {
        detector(Backends::default())
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let err = offline().analyze(AnalyzeRequest::new("  \n ")).await.unwrap_err();
        assert!(matches!(err, DetectionError::EmptyInput));
    }

    #[tokio::test]
    async fn test_no_sentences_rejected() {
        let err = offline().analyze(AnalyzeRequest::new("Hi. Ok.")).await.unwrap_err();
        assert!(matches!(err, DetectionError::NoSentences));
    }

    #[tokio::test]
    async fn test_oversize_rejected_by_default() {
        let config = AppConfig {
            max_text_length: 20,
            ..AppConfig::default()
        };
        let d = Detector::with_backends(config, ZoneThresholds::default(), Backends::default())
            .unwrap();
        let err = d.analyze(AnalyzeRequest::new(THREE)).await.unwrap_err();
        assert!(matches!(err, DetectionError::TextTooLong { limit: 20, .. }));
    }

    #[tokio::test]
    async fn test_oversize_truncated_by_policy() {
        let config = AppConfig {
            max_text_length: 60,
            oversize_policy: OversizePolicy::Truncate,
            ..AppConfig::default()
        };
        let d = Detector::with_backends(config, ZoneThresholds::default(), Backends::default())
            .unwrap();
        let resp = d.analyze(AnalyzeRequest::new(THREE)).await.unwrap();
        assert!(resp.truncated);
        assert_eq!(resp.sentences.len(), 1);
        assert_eq!(resp.sentences[0].text, "The committee met on Tuesday to review the budget.");
    }

    #[tokio::test]
    async fn test_offline_pipeline_uses_fallback() {
        let resp = offline().analyze(AnalyzeRequest::new(THREE)).await.unwrap();
        assert_eq!(resp.sentences.len(), 3);
        assert!(resp.document.is_none());
        assert_eq!(resp.overall_stats.total_sentences, 3);
        for (i, s) in resp.sentences.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(
                s.arbitration,
                ArbitrationMode::Fallback {
                    reason: FallbackReason::NotConfigured
                }
            );
            assert_eq!(s.scores.classifier, None);
            assert_eq!(s.scores.variability, None);
        }
    }

    #[tokio::test]
    async fn test_three_sentences_make_three_chunks() {
        let d = detector(Backends {
            embedding: Some(Arc::new(StubEmbedding::new(16))),
            ..Backends::default()
        });
        let resp = d.analyze(AnalyzeRequest::new(THREE)).await.unwrap();
        let doc = resp.document.expect("document verdict");
        assert_eq!(doc.chunk_count, 3);
        assert!(resp.sentences.iter().all(|s| s.scores.variability == Some(doc.soft_score)));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let d = detector(Backends {
            embedding: Some(Arc::new(StubEmbedding::new(16).failing_encode())),
            ..Backends::default()
        });
        let resp = d.analyze(AnalyzeRequest::new(THREE)).await.unwrap();
        assert!(resp.document.is_none());
        assert_eq!(resp.sentences.len(), 3);
    }

    #[tokio::test]
    async fn test_external_judge_and_classifier() {
        let judge = Arc::new(StubJudge::replying(
            r#"{"classification": "ai", "confidence": 0.8, "reasoning": "flat"}"#,
        ));
        let d = detector(Backends {
            embedding: None,
            classifier: Some(Arc::new(StubClassifier::answering(0.9))),
            judge: Some(judge.clone()),
        });
        let resp = d.analyze(AnalyzeRequest::new(THREE)).await.unwrap();
        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
        assert_eq!(resp.overall_stats.ai_count, 3);
        assert_eq!(resp.overall_stats.ai_percentage, 100.0);
        for (i, s) in resp.sentences.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.classification, Classification::Ai);
            assert_eq!(s.scores.classifier, Some(0.87));
            assert_eq!(s.scores.arbitration_confidence, 0.8);
        }
    }

    #[tokio::test]
    async fn test_failing_classifier_probed_once_per_request() {
        let classifier =
            Arc::new(StubClassifier::failing().with_delay(Duration::from_millis(200)));
        let d = detector(Backends {
            classifier: Some(classifier.clone()),
            ..Backends::default()
        });

        let started = Instant::now();
        let resp = d.analyze(AnalyzeRequest::new(numbered(8))).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(resp.sentences.len(), 8);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
        for s in &resp.sentences {
            assert_eq!(s.scores.classifier, None);
            assert_eq!(
                s.arbitration,
                ArbitrationMode::Fallback {
                    reason: FallbackReason::NotConfigured
                }
            );
        }
        assert!(!d.health().components.classifier);
    }

    #[tokio::test]
    async fn test_results_reordered_when_tasks_finish_out_of_order() {
        let d = detector(Backends {
            judge: Some(Arc::new(IndexedJudge {
                total: 6,
                panic_on: None,
            })),
            ..Backends::default()
        });
        let resp = d.analyze(AnalyzeRequest::new(numbered(6))).await.unwrap();

        assert_eq!(resp.sentences.len(), 6);
        for (i, s) in resp.sentences.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.text, format!("Sentence number {} reads fine.", i));
            assert_eq!(s.reasoning, format!("sentence {}", i));
            assert_eq!(
                s.arbitration,
                ArbitrationMode::External {
                    model: "indexed-judge".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_crashed_task_keeps_precomputed_fallback() {
        let d = detector(Backends {
            judge: Some(Arc::new(IndexedJudge {
                total: 4,
                panic_on: Some(2),
            })),
            ..Backends::default()
        });
        let resp = d.analyze(AnalyzeRequest::new(numbered(4))).await.unwrap();

        assert_eq!(resp.sentences.len(), 4);
        assert_eq!(resp.overall_stats.total_sentences, 4);
        for (i, s) in resp.sentences.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.text, format!("Sentence number {} reads fine.", i));
            if i == 2 {
                assert_eq!(
                    s.arbitration,
                    ArbitrationMode::Fallback {
                        reason: FallbackReason::Transport
                    }
                );
            } else {
                assert_eq!(s.reasoning, format!("sentence {}", i));
            }
        }
    }

    #[tokio::test]
    async fn test_arbitration_disabled_per_request() {
        let judge = Arc::new(StubJudge::replying(r#"{"classification": "ai"}"#));
        let d = detector(Backends {
            judge: Some(judge.clone()),
            ..Backends::default()
        });
        let mut req = AnalyzeRequest::new(THREE);
        req.use_arbitration = false;
        let resp = d.analyze(req).await.unwrap();
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
        assert_eq!(resp.sentences.len(), 3);
    }

    #[tokio::test]
    async fn test_presegmented_sentences_are_kept() {
        let mut req = AnalyzeRequest::new("");
        req.sentences = Some(vec![
            "first line without a period".to_string(),
            "  ".to_string(),
            "second one here too".to_string(),
        ]);
        let resp = offline().analyze(req).await.unwrap();
        let texts: Vec<&str> = resp.sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["first line without a period", "second one here too"]);
    }

    #[tokio::test]
    async fn test_health_and_warm_up() {
        let d = detector(Backends {
            embedding: Some(Arc::new(StubEmbedding::new(8))),
            classifier: Some(Arc::new(StubClassifier::answering(0.6))),
            judge: Some(Arc::new(StubJudge::replying("{}"))),
        });
        let before = d.health();
        assert_eq!(before.status, HealthStatus::Degraded);
        assert!(!before.components.embedding);

        let after = d.warm_up().await;
        assert_eq!(after.status, HealthStatus::Healthy);
        assert!(after.components.embedding && after.components.classifier);
        assert!(after.components.arbitration);
    }

    #[tokio::test]
    async fn test_measure_spread_requires_embedding() {
        let err = offline().measure_spread(THREE, 50).await.unwrap_err();
        assert!(matches!(err, DetectionError::ModelLoad { .. }));

        let d = detector(Backends {
            embedding: Some(Arc::new(StubEmbedding::new(8))),
            ..Backends::default()
        });
        let report = d.measure_spread(THREE, 50).await.unwrap();
        assert_eq!(report.chunk_count, 3);
    }

    #[test]
    fn test_sentences_from_list_respects_limit() {
        let list = vec!["abc def".to_string(), "ghi jkl".to_string()];
        let out = sentences_from_list(list.clone(), 7);
        assert_eq!(out.len(), 1);
        let out = sentences_from_list(list, 15);
        assert_eq!(out.len(), 2);
        assert_eq!((out[1].start, out[1].end), (8, 15));
    }
}
