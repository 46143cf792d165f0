//! Embedding backends for the similarity service
//!
//! OpenAI-compatible `/embeddings` (native batching) and Ollama
//! `/api/embeddings` (one text per request). Every failure is reported as
//! [`LinkError::Similarity`], which callers treat as a degraded path.

use std::time::Duration;

use async_trait::async_trait;
use authorlink_core::{LinkError, LlmConfig, LlmProvider, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Source of text embeddings
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per text, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model name, reported in logs
    fn model(&self) -> &str;
}

fn similarity_error(message: String) -> LinkError {
    LinkError::Similarity(message)
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| similarity_error(format!("cannot build HTTP client: {e}")))
}

/// Send `body` as JSON and decode the reply
async fn post_json<B, R>(request: RequestBuilder, body: &B, service: &str) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| similarity_error(format!("{service} unreachable: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(similarity_error(format!(
            "{service} answered {status}: {detail}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| similarity_error(format!("{service} reply not understood: {e}")))
}

/// OpenAI-compatible embedding endpoint
pub struct OpenAiEmbedding {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Uses the LLM key and base URL with the embedding model
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let Some(api_key) = config.openai_api_key.as_deref() else {
            return Err(LinkError::Config(
                "embedding provider needs an API key (OPENAI_API_KEY)".to_string(),
            ));
        };

        let mut client = Self::new(api_key, config.embedding_model.as_str());
        client.http = http_client(config.timeout_secs)?;
        match config.openai_base_url.as_deref() {
            Some(url) => Ok(client.with_base_url(url)),
            None => Ok(client),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| similarity_error("embedding endpoint returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key);
        let body = EmbeddingsBody {
            model: &self.model,
            input: texts,
        };
        let mut reply: EmbeddingsReply = post_json(request, &body, "embedding endpoint").await?;

        if reply.data.len() != texts.len() {
            return Err(similarity_error(format!(
                "asked for {} embeddings, received {}",
                texts.len(),
                reply.data.len()
            )));
        }
        reply.data.sort_unstable_by_key(|row| row.index);
        Ok(reply.data.into_iter().map(|row| row.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Local Ollama embedding endpoint
pub struct OllamaEmbedding {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaEmbeddingBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingReply {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.as_str(), config.embedding_model.as_str());
        client.http = http_client(config.timeout_secs)?;
        Ok(client)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = self.http.post(format!("{}/api/embeddings", self.base_url));
        let body = OllamaEmbeddingBody {
            model: &self.model,
            prompt: text,
        };
        let reply: OllamaEmbeddingReply = post_json(request, &body, "Ollama").await?;
        Ok(reply.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embedding backend matching the configured LLM provider
pub fn create_embedding_client(config: &LlmConfig) -> Result<Box<dyn EmbeddingClient>> {
    let client: Box<dyn EmbeddingClient> = match config.provider {
        LlmProvider::Ollama => Box::new(OllamaEmbedding::from_config(config)?),
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Box::new(OpenAiEmbedding::from_config(config)?)
        }
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_from_config_requires_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiEmbedding::from_config(&config),
            Err(LinkError::Config(_))
        ));
    }

    #[test]
    fn test_openai_base_url_override() {
        let config = LlmConfig {
            openai_api_key: Some("test-key".to_string()),
            openai_base_url: Some("https://api.deepseek.com/v1/".to_string()),
            ..LlmConfig::default()
        };
        let client = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://api.deepseek.com/v1");
        assert_eq!(client.model(), "text-embedding-3-small");
    }

    #[test]
    fn test_factory_selects_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            embedding_model: "nomic-embed-text".to_string(),
            ..LlmConfig::default()
        };
        let client = create_embedding_client(&config).unwrap();
        assert_eq!(client.model(), "nomic-embed-text");
    }
}
