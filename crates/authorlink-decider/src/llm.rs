//! LLM chat backends for the decision oracle
//!
//! OpenAI-compatible chat completions (OpenAI, Azure, DeepSeek) and the
//! Ollama generate endpoint. Transport and API failures surface as
//! [`LinkError::Oracle`] so the orchestrator can apply its oracle policy.

use std::time::Duration;

use async_trait::async_trait;
use authorlink_core::{LinkError, LlmClient, LlmConfig, LlmProvider, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn oracle_error(message: String) -> LinkError {
    LinkError::Oracle(message)
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LinkError::Config(format!("cannot build HTTP client: {e}")))
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
        .map_err(|e| oracle_error(format!("{service} unreachable: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(oracle_error(format!("{service} answered {status}: {detail}")));
    }

    response
        .json()
        .await
        .map_err(|e| oracle_error(format!("{service} reply not understood: {e}")))
}

// ============================================================================
// OpenAI-compatible chat
// ============================================================================

/// Chat completions client for OpenAI-compatible APIs
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Requires `openai_api_key`; honors `openai_base_url` and the timeout
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let Some(api_key) = config.openai_api_key.as_deref() else {
            return Err(LinkError::Config(
                "chat provider needs an API key (OPENAI_API_KEY)".to_string(),
            ));
        };

        let mut client = Self::new(
            api_key,
            config.model.as_str(),
            config.max_tokens,
            config.temperature,
        );
        client.http = http_client(config.timeout_secs)?;
        match config.openai_base_url.as_deref() {
            Some(url) => Ok(client.with_base_url(url)),
            None => Ok(client),
        }
    }

    /// Point at Azure, DeepSeek or another compatible endpoint
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        let body = ChatBody {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let reply: ChatReply = post_json(request, &body, "chat endpoint").await?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| oracle_error("chat endpoint returned no choices".to_string()))
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Local Ollama generate client
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateReply {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut client = Self::new(config.ollama_url.as_str(), config.model.as_str());
        client.http = http_client(config.timeout_secs)?;
        client.temperature = config.temperature;
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self.http.post(format!("{}/api/generate", self.base_url));
        let body = GenerateBody {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let reply: GenerateReply = post_json(request, &body, "Ollama").await?;
        Ok(reply.response)
    }
}

/// Chat backend for the configured provider
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let client: Box<dyn LlmClient> = match config.provider {
        LlmProvider::Ollama => Box::new(OllamaClient::from_config(config)?),
        LlmProvider::OpenAI | LlmProvider::Azure => Box::new(OpenAiClient::from_config(config)?),
    };
    Ok(client)
}

// ============================================================================
// Tests
// ============================================================================
