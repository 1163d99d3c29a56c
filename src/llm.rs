//! Chat completions over an OpenAI-compatible HTTP endpoint.
//!
//! Any server exposing `POST {base}/chat/completions` works: a local
//! vLLM / llama.cpp / Ollama instance serving the default instruct model,
//! or a hosted API.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::engine::{ChatMessage, ChatModel, ChatSampling};

/// Instruct model requested when none is configured.
pub const DEFAULT_CHAT_MODEL: &str = "Qwen/Qwen2.5-3B-Instruct";

/// Base URL used when none is configured.
pub const DEFAULT_CHAT_ENDPOINT: &str = "http://127.0.0.1:8000/v1";

/// Environment variable holding an optional bearer token.
pub const API_KEY_ENV: &str = "F5_STUDIO_CHAT_API_KEY";

// OpenAI API request
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

// OpenAI API response
#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        // A reply is model inference: no overall deadline, only on connect.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Client for `endpoint`, taking the token from [`API_KEY_ENV`].
    pub fn from_env(endpoint: &str, model: &str) -> Result<Self> {
        Self::new(endpoint, model, std::env::var(API_KEY_ENV).ok())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

impl ChatModel for OpenAiChat {
    fn respond(&self, messages: &[ChatMessage], sampling: &ChatSampling) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: sampling.max_new_tokens,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
        };
        tracing::debug!("Sending {} message(s) to {}", messages.len(), self.completions_url());

        let mut call = self.client.post(self.completions_url()).json(&request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call
            .send()
            .with_context(|| format!("Chat request to {} failed", self.endpoint))?;

        let status = response.status();
        let body = response.text().context("Cannot read chat response body")?;
        if !status.is_success() {
            tracing::error!("Chat API error: HTTP {}, body: {}", status, body);
            bail!("Chat API error: HTTP {}: {}", status, body);
        }
        parse_completion(&body)
    }
}

/// First choice's message content, trimmed.
fn parse_completion(body: &str) -> Result<String> {
    let completion: ChatCompletion =
        serde_json::from_str(body).context("Malformed chat completion response")?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("Chat completion response has no content"))
}
