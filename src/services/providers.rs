// Provider Service
// HTTP calls to the external collaborators: chat-completion judge,
// embedding endpoint and hosted text classifier

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::config_store::AppConfig;

pub const GROQ_DEFAULT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const EMBEDDING_DEFAULT_URL: &str = "http://127.0.0.1:8080/v1/embeddings";
pub const EMBEDDING_DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
pub const CLASSIFIER_DEFAULT_URL: &str =
    "https://api-inference.huggingface.co/models/Hello-SimpleAI/chatgpt-detector-roberta";
pub const CLASSIFIER_DEFAULT_MODEL: &str = "Hello-SimpleAI/chatgpt-detector-roberta";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::HttpError(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// One `{label, score}` pair from a hosted text-classification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

// Inference endpoints answer either `[[{..}]]` (batched) or `[{..}]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    timeout_secs: u64,
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            timeout_secs: timeout.as_secs(),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout_secs)
        } else {
            ProviderError::HttpError(err)
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::ApiError {
            status: status.as_u16(),
            message: body,
        })
    }

    /// OpenAI-compatible chat completion with a single user message.
    pub async fn chat_completion(
        &self,
        url: &str,
        model: &str,
        api_key: &str,
        user: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<ChatResult, ProviderError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            }],
            max_tokens,
            temperature,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let response = Self::check_status(response).await?;

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }

    /// OpenAI-compatible `/embeddings` call. Vectors come back in input order.
    pub async fn embed(
        &self,
        url: &str,
        model: &str,
        api_key: Option<&str>,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbeddingRequest {
            model,
            input: inputs,
        };

        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let mut data: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        if data.data.len() != inputs.len() {
            return Err(ProviderError::JsonError(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                data.data.len()
            )));
        }

        data.data.sort_by_key(|d| d.index);
        Ok(data.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Hosted text-classification call (`{"inputs": text}`).
    pub async fn classify_text(
        &self,
        url: &str,
        api_key: Option<&str>,
        text: &str,
    ) -> Result<Vec<LabelScore>, ProviderError> {
        let request = serde_json::json!({ "inputs": text });

        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let response = Self::check_status(response).await?;

        let data: ClassificationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let labels = match data {
            ClassificationResponse::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            ClassificationResponse::Flat(flat) => flat,
        };

        if labels.is_empty() {
            return Err(ProviderError::MissingContent);
        }
        Ok(labels)
    }
}

fn env_key_names(provider: &str) -> &'static [&'static str] {
    match provider {
        "groq" => &["GROQ_API_KEY", "TEXT_SPOTTER_GROQ_API_KEY"],
        "embedding" => &["EMBEDDING_API_KEY", "TEXT_SPOTTER_EMBEDDING_API_KEY"],
        "huggingface" | "classifier" => &["HF_API_TOKEN", "TEXT_SPOTTER_HF_API_TOKEN"],
        _ => &[],
    }
}

/// Get API key from environment or the loaded config
pub fn resolve_api_key(provider: &str, config: &AppConfig) -> Option<String> {
    for key in env_key_names(provider) {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    config
        .api_keys
        .get(provider)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_api_key_from_config() {
        let mut config = AppConfig::default();
        config
            .api_keys
            .insert("unit-test-provider".to_string(), "  secret  ".to_string());
        assert_eq!(
            resolve_api_key("unit-test-provider", &config),
            Some("secret".to_string())
        );
        assert_eq!(resolve_api_key("missing", &config), None);
    }

    #[test]
    fn test_blank_key_is_ignored() {
        let mut config = AppConfig::default();
        config.api_keys.insert("blank".to_string(), "   ".to_string());
        assert_eq!(resolve_api_key("blank", &config), None);
    }

    #[test]
    fn test_classification_response_shapes() {
        let nested: ClassificationResponse =
            serde_json::from_str(r#"[[{"label":"Human","score":0.7},{"label":"ChatGPT","score":0.3}]]"#)
                .unwrap();
        assert!(matches!(nested, ClassificationResponse::Nested(ref v) if v[0].len() == 2));

        let flat: ClassificationResponse =
            serde_json::from_str(r#"[{"label":"Human","score":0.7}]"#).unwrap();
        assert!(matches!(flat, ClassificationResponse::Flat(ref v) if v.len() == 1));
    }

    #[test]
    fn test_timeout_error_is_detected() {
        assert!(ProviderError::Timeout(30).is_timeout());
        assert!(!ProviderError::MissingContent.is_timeout());
    }
}
