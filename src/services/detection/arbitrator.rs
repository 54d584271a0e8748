// Arbitrator
// Final per-sentence decision: an external LLM judge when configured, with
// deterministic score voting whenever the judge is absent or fails

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::style_scorer::{round4, FeatureVector};
use super::zones::ZoneLabel;
use crate::models::Classification;
use crate::services::config_store::ArbitrationConfig;
use crate::services::providers::{ProviderClient, ProviderError};
use crate::services::text_processor::SentenceContext;

const HUMAN_THRESHOLD: f64 = 0.6;
const AI_THRESHOLD: f64 = 0.4;

/// A score that may or may not have been produced for this request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Scored(f64),
    Unavailable,
}

impl Signal {
    pub fn value(&self) -> Option<f64> {
        match self {
            Signal::Scored(v) => Some(*v),
            Signal::Unavailable => None,
        }
    }
}

impl From<Option<f64>> for Signal {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Signal::Unavailable, Signal::Scored)
    }
}

/// Everything the other scorers know about one sentence. All scores are
/// human-likeness in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceScores {
    pub style: f64,
    pub style_features: FeatureVector,
    pub patterns: f64,
    pub classifier: Signal,
    /// Document-level zone soft score
    pub variability: Signal,
    pub zone: Option<ZoneLabel>,
}

impl EvidenceScores {
    /// The score voted against `style` in fallback mode.
    fn second_vote(&self) -> f64 {
        match (self.classifier, self.variability) {
            (Signal::Scored(v), _) => v,
            (Signal::Unavailable, Signal::Scored(v)) => v,
            (Signal::Unavailable, Signal::Unavailable) => self.style,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NotConfigured,
    Timeout,
    Transport,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ArbitrationMode {
    External { model: String },
    Fallback { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationDecision {
    pub classification: Classification,
    pub confidence: f64,
    pub reasoning: String,
    pub mode: ArbitrationMode,
}

/// Fallback voting over two human-likeness scores.
pub fn decide_fallback(a: f64, b: f64) -> (Classification, f64) {
    let avg = (a + b) / 2.0;
    let (label, confidence) = if avg > HUMAN_THRESHOLD {
        (Classification::Human, avg)
    } else if avg < AI_THRESHOLD {
        (Classification::Ai, 1.0 - avg)
    } else {
        (Classification::Suspicious, avg)
    };
    (label, round4(confidence.clamp(0.0, 1.0)))
}

pub trait JudgeBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// Raw completion text for a prompt.
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>>;
}

/// Groq (OpenAI-compatible) chat completion judge.
pub struct GroqJudge {
    client: ProviderClient,
    url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
}

impl GroqJudge {
    pub fn new(config: &ArbitrationConfig, api_key: String) -> Self {
        Self {
            client: ProviderClient::new(Duration::from_secs(config.timeout_secs)),
            url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl JudgeBackend for GroqJudge {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let result = self
                .client
                .chat_completion(
                    &self.url,
                    &self.model,
                    &self.api_key,
                    prompt,
                    self.max_tokens,
                    self.temperature,
                )
                .await?;
            debug!("[ARBITRATOR] Judge answered in {}ms", result.latency_ms);
            Ok(result.content)
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct JudgeVerdict {
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn strip_code_fences(content: &str) -> &str {
    let mut s = content.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn extract_json(content: &str) -> Result<&str, String> {
    if content.starts_with('{') {
        return Ok(content);
    }
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&content[start..=end]),
        (Some(_), _) => Err("Invalid JSON response".to_string()),
        (None, _) => Err("No JSON in response".to_string()),
    }
}

/// Parse the judge's answer. Unknown labels become "suspicious" and the
/// confidence is clamped; text that is not a JSON object is an error.
pub fn parse_verdict(content: &str) -> Result<(Classification, f64, String), String> {
    let json = extract_json(strip_code_fences(content))?;
    let verdict: JudgeVerdict =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse verdict: {}", e))?;

    let classification = verdict
        .classification
        .as_deref()
        .and_then(Classification::parse)
        .unwrap_or(Classification::Suspicious);
    let confidence = verdict
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let reasoning = verdict
        .reasoning
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "No reasoning provided".to_string());

    Ok((classification, round4(confidence), reasoning))
}

fn fmt_signal(signal: Signal) -> String {
    match signal {
        Signal::Scored(v) => format!("{:.3}", v),
        Signal::Unavailable => "unavailable".to_string(),
    }
}

pub fn build_prompt(sentence: &str, context: &SentenceContext, evidence: &EvidenceScores) -> String {
    let f = &evidence.style_features;
    let zone = evidence.zone.map_or("unavailable", |z| z.as_str());
    format!(
        r#"You are an AI text detection arbitrator. Decide whether one sentence was written by a human or generated by an AI model.

Sentence: "{sentence}"
Context Before: "{before}"
Context After: "{after}"

Detector Results (all scores: 0=AI, 1=Human):
- Statistical style analysis: {style:.3}
  Features: burstiness={b:.3}, vocabulary_richness={v:.3}, word_frequency={w:.3}, punctuation={p:.3}, complexity={c:.3}, entropy={e:.3}
- Phrase pattern analysis: {patterns:.3}
- Learned classifier: {classifier}
- Document embedding variability: {variability} (zone: {zone})

Classify this sentence as: human, suspicious, or ai

Guidelines:
- "human": the evidence leans towards human (scores > 0.6)
- "suspicious": mixed signals or borderline scores (0.4-0.6)
- "ai": the evidence leans towards AI (scores < 0.4)
- Consider context and feature details in your reasoning

Respond ONLY with JSON in this exact format:
{{"classification": "human|suspicious|ai", "confidence": 0.0-1.0, "reasoning": "brief explanation"}}"#,
        sentence = sentence,
        before = context.before.as_deref().unwrap_or(""),
        after = context.after.as_deref().unwrap_or(""),
        style = evidence.style,
        b = f.burstiness,
        v = f.vocabulary_richness,
        w = f.word_frequency,
        p = f.punctuation,
        c = f.complexity,
        e = f.entropy,
        patterns = evidence.patterns,
        classifier = fmt_signal(evidence.classifier),
        variability = fmt_signal(evidence.variability),
        zone = zone,
    )
}

#[derive(Clone)]
pub struct Arbitrator {
    judge: Option<Arc<dyn JudgeBackend>>,
    timeout: Duration,
}

impl Arbitrator {
    pub fn new(judge: Option<Arc<dyn JudgeBackend>>, timeout: Duration) -> Self {
        Self { judge, timeout }
    }

    pub fn fallback_only() -> Self {
        Self {
            judge: None,
            timeout: Duration::from_secs(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.judge.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.judge.as_ref().map(|j| j.model_name())
    }

    /// Never fails: any judge problem degrades to fallback voting.
    pub async fn decide(
        &self,
        sentence: &str,
        context: &SentenceContext,
        evidence: &EvidenceScores,
    ) -> ArbitrationDecision {
        let Some(judge) = &self.judge else {
            return Self::fallback(evidence, FallbackReason::NotConfigured);
        };

        let prompt = build_prompt(sentence, context, evidence);
        let start = Instant::now();

        let content = match tokio::time::timeout(self.timeout, judge.complete(&prompt)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                let reason = if e.is_timeout() {
                    FallbackReason::Timeout
                } else {
                    FallbackReason::Transport
                };
                warn!("[ARBITRATOR] Judge call failed ({:?}): {}", reason, e);
                return Self::fallback(evidence, reason);
            }
            Err(_) => {
                warn!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "[ARBITRATOR] Judge timed out after {:?}", self.timeout
                );
                return Self::fallback(evidence, FallbackReason::Timeout);
            }
        };

        match parse_verdict(&content) {
            Ok((classification, confidence, reasoning)) => {
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "[ARBITRATOR] {} -> {} ({:.3})",
                    judge.model_name(),
                    classification.as_str(),
                    confidence
                );
                ArbitrationDecision {
                    classification,
                    confidence,
                    reasoning,
                    mode: ArbitrationMode::External {
                        model: judge.model_name().to_string(),
                    },
                }
            }
            Err(e) => {
                warn!("[ARBITRATOR] Malformed judge response: {}", e);
                Self::fallback(evidence, FallbackReason::Malformed)
            }
        }
    }

    pub fn fallback(evidence: &EvidenceScores, reason: FallbackReason) -> ArbitrationDecision {
        let (classification, confidence) = decide_fallback(evidence.style, evidence.second_vote());
        let reasoning = match classification {
            Classification::Human => "Available signals indicate human writing",
            Classification::Ai => "Available signals indicate AI-generated text",
            Classification::Suspicious => "Mixed or borderline signals",
        };
        ArbitrationDecision {
            classification,
            confidence,
            reasoning: reasoning.to_string(),
            mode: ArbitrationMode::Fallback { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::detection::test_support::StubJudge;

    fn evidence(style: f64, classifier: Signal, variability: Signal) -> EvidenceScores {
        EvidenceScores {
            style,
            style_features: FeatureVector::neutral(),
            patterns: 0.5,
            classifier,
            variability,
            zone: None,
        }
    }

    #[test]
    fn test_decide_fallback_reference_points() {
        assert_eq!(decide_fallback(0.8, 0.8), (Classification::Human, 0.8));
        assert_eq!(decide_fallback(0.1, 0.2), (Classification::Ai, 0.85));
        assert_eq!(decide_fallback(0.5, 0.5), (Classification::Suspicious, 0.5));
    }

    #[test]
    fn test_decide_fallback_thresholds_are_exclusive() {
        assert_eq!(decide_fallback(0.6, 0.6).0, Classification::Suspicious);
        assert_eq!(decide_fallback(0.4, 0.4).0, Classification::Suspicious);
    }

    #[test]
    fn test_second_vote_selection() {
        let e = evidence(0.9, Signal::Scored(0.1), Signal::Scored(0.5));
        assert_eq!(e.second_vote(), 0.1);
        let e = evidence(0.9, Signal::Unavailable, Signal::Scored(0.5));
        assert_eq!(e.second_vote(), 0.5);
        let e = evidence(0.9, Signal::Unavailable, Signal::Unavailable);
        assert_eq!(e.second_vote(), 0.9);
    }

    #[test]
    fn test_parse_verdict_with_fences() {
        let content = "```json\n{\"classification\": \"AI\", \"confidence\": 0.91, \"reasoning\": \"stock phrasing\"}\n```";
        let (label, confidence, reasoning) = parse_verdict(content).unwrap();
        assert_eq!(label, Classification::Ai);
        assert_eq!(confidence, 0.91);
        assert_eq!(reasoning, "stock phrasing");
    }

    #[test]
    fn test_parse_verdict_normalizes_bad_fields() {
        let (label, confidence, reasoning) =
            parse_verdict(r#"Sure! {"classification": "robot", "confidence": 3.2}"#).unwrap();
        assert_eq!(label, Classification::Suspicious);
        assert_eq!(confidence, 1.0);
        assert_eq!(reasoning, "No reasoning provided");
    }

    #[test]
    fn test_parse_verdict_rejects_non_json() {
        assert!(parse_verdict("I think it is human.").is_err());
        assert!(parse_verdict("{not json}").is_err());
    }

    #[test]
    fn test_prompt_mentions_all_evidence() {
        let ctx = SentenceContext {
            before: Some("Earlier line.".into()),
            after: None,
        };
        let prompt = build_prompt(
            "The sentence.",
            &ctx,
            &evidence(0.42, Signal::Unavailable, Signal::Scored(0.75)),
        );
        assert!(prompt.contains("\"The sentence.\""));
        assert!(prompt.contains("Context Before: \"Earlier line.\""));
        assert!(prompt.contains("Statistical style analysis: 0.420"));
        assert!(prompt.contains("Learned classifier: unavailable"));
        assert!(prompt.contains("Document embedding variability: 0.750"));
    }

    #[tokio::test]
    async fn test_not_configured_uses_fallback() {
        let arb = Arbitrator::fallback_only();
        let d = arb
            .decide("s", &SentenceContext::default(), &evidence(0.8, Signal::Scored(0.8), Signal::Unavailable))
            .await;
        assert_eq!(d.classification, Classification::Human);
        assert_eq!(d.confidence, 0.8);
        assert_eq!(d.mode, ArbitrationMode::Fallback { reason: FallbackReason::NotConfigured });
    }

    #[tokio::test]
    async fn test_external_verdict_is_used() {
        let judge = Arc::new(StubJudge::replying(
            r#"{"classification": "ai", "confidence": 0.7, "reasoning": "uniform"}"#,
        ));
        let arb = Arbitrator::new(Some(judge), Duration::from_secs(1));
        let d = arb
            .decide("s", &SentenceContext::default(), &evidence(0.9, Signal::Unavailable, Signal::Unavailable))
            .await;
        assert_eq!(d.classification, Classification::Ai);
        assert_eq!(d.confidence, 0.7);
        assert_eq!(d.mode, ArbitrationMode::External { model: "stub-judge".into() });
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back() {
        let arb = Arbitrator::new(Some(Arc::new(StubJudge::replying("no idea"))), Duration::from_secs(1));
        let d = arb
            .decide("s", &SentenceContext::default(), &evidence(0.1, Signal::Scored(0.2), Signal::Unavailable))
            .await;
        assert_eq!(d.classification, Classification::Ai);
        assert_eq!(d.confidence, 0.85);
        assert_eq!(d.mode, ArbitrationMode::Fallback { reason: FallbackReason::Malformed });
    }

    #[tokio::test]
    async fn test_transport_error_falls_back() {
        let arb = Arbitrator::new(Some(Arc::new(StubJudge::failing())), Duration::from_secs(1));
        let d = arb
            .decide("s", &SentenceContext::default(), &evidence(0.5, Signal::Unavailable, Signal::Unavailable))
            .await;
        assert_eq!(d.classification, Classification::Suspicious);
        assert_eq!(d.mode, ArbitrationMode::Fallback { reason: FallbackReason::Transport });
    }

    #[tokio::test]
    async fn test_slow_judge_times_out() {
        let judge = StubJudge::replying(r#"{"classification": "human", "confidence": 0.9}"#)
            .with_delay(Duration::from_millis(500));
        let arb = Arbitrator::new(Some(Arc::new(judge)), Duration::from_millis(50));
        let d = arb
            .decide("s", &SentenceContext::default(), &evidence(0.9, Signal::Unavailable, Signal::Unavailable))
            .await;
        assert_eq!(d.mode, ArbitrationMode::Fallback { reason: FallbackReason::Timeout });
        assert_eq!(d.classification, Classification::Human);
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_value(ArbitrationMode::Fallback {
            reason: FallbackReason::NotConfigured,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"mode": "fallback", "reason": "not_configured"}));
    }
}
