use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Maps text to dense vectors. One output vector per input, in input order.
///
/// Vector length is provider-defined; callers only rely on every vector from
/// the same provider having the same length.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let vectors = self.embed(&[text.to_string()]).await?;
        let returned = vectors.len();
        let mut vectors = vectors.into_iter();
        match (vectors.next(), returned) {
            (Some(vector), 1) => Ok(vector),
            _ => Err(SearchError::provider(
                self.name(),
                format!("expected 1 vector, got {returned}"),
            )),
        }
    }
}

#[async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        (**self).embed(texts).await
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let endpoint = Url::parse(endpoint.trim()).map_err(|error| {
            SearchError::Validation(format!("invalid embedding endpoint {endpoint}: {error}"))
        })?;

        Ok(Self {
            endpoint,
            api_key: api_key.and_then(|key| non_empty(&key)),
            model: model.into(),
            timeout,
        })
    }

    /// Reads `EMBEDDING_ENDPOINT`, `EMBEDDING_MODEL` and `EMBEDDING_API_KEY`
    /// (falling back to `OPENAI_API_KEY`), with built-in defaults for the
    /// endpoint and model.
    pub fn from_env(timeout: Duration) -> Result<Self, SearchError> {
        let endpoint =
            env_value("EMBEDDING_ENDPOINT").unwrap_or_else(|| DEFAULT_EMBEDDING_ENDPOINT.to_string());
        let model = env_value("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let api_key = env_value("EMBEDDING_API_KEY").or_else(|| env_value("OPENAI_API_KEY"));

        Self::new(&endpoint, api_key, model, timeout)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| non_empty(&value))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for OpenAI-compatible `/v1/embeddings` endpoints.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| SearchError::provider("openai", error.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = self.name(),
            model = %self.config.model,
            batch_size = texts.len(),
            "requesting embeddings"
        );

        let mut request = self
            .client
            .post(self.config.endpoint.clone())
            .header("content-type", "application/json")
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: texts,
            });

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            error!(provider = self.name(), error = %error, "embedding request failed");
            SearchError::provider(self.name(), format!("request failed: {error}"))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| SearchError::provider(self.name(), format!("unreadable body: {error}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            error!(provider = self.name(), %status, "embedding endpoint returned an error");
            return Err(SearchError::provider(
                self.name(),
                format!("{} returned {status}: {detail}", self.config.endpoint),
            ));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|error| SearchError::provider(self.name(), format!("malformed response: {error}")))?;

        order_vectors(parsed.data, texts.len())
            .map_err(|details| SearchError::provider(self.name(), details))
    }
}

/// Puts response vectors back in input order. Indices, when present, must be
/// a permutation of `0..expected`.
fn order_vectors(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, String> {
    if data.len() != expected {
        return Err(format!(
            "embedding count {} doesn't match input count {expected}",
            data.len()
        ));
    }

    let indexed = data.iter().filter(|item| item.index.is_some()).count();
    if indexed == 0 {
        return Ok(data.into_iter().map(|item| item.embedding).collect());
    }
    if indexed != expected {
        return Err(format!("{indexed} of {expected} embeddings carry an index"));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in data {
        let index = item.index.unwrap_or(expected);
        let Some(slot) = slots.get_mut(index) else {
            return Err(format!("embedding index {index} out of range 0..{expected}"));
        };
        if slot.is_some() {
            return Err(format!("duplicate embedding index {index}"));
        }
        *slot = Some(item.embedding);
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Offline provider that hashes character trigrams into a fixed number of
/// buckets. Deterministic, needs no network, and good enough to rank
/// near-duplicate wording.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "char-ngram"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
