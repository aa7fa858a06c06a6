//! Text-generation backends.
//!
//! | Backend | Endpoint | Available when |
//! |---------|----------|----------------|
//! | `ollama` | `POST {url}/api/chat`, streaming off | `GET {url}/api/tags` succeeds |
//! | `claude` | `POST https://api.anthropic.com/v1/messages` | `ANTHROPIC_API_KEY` is set |
//!
//! Both put the retrieved context into the system prompt.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use chat_recall_core::rag::{GenerationBackend, Role, Turn};

use crate::config::GenerationConfig;

pub struct OllamaBackend {
    url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// System prompt with the context block appended under a `### Context`
/// heading. An empty context leaves the prompt unchanged.
pub fn system_with_context(system: &str, context: &str) -> String {
    if context.is_empty() {
        system.to_string()
    } else {
        format!("{}\n\n### Context\n{}", system, context)
    }
}

impl OllamaBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model_name().to_string(),
            client,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, system: &str, turns: &[Turn], context: &str) -> Result<String> {
        let full_system = system_with_context(system, context);
        let mut messages = vec![ChatMessage {
            role: "system",
            content: &full_system,
        }];
        messages.extend(turns.iter().map(chat_message));

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body);
        }

        let body: ChatResponse = response.json().await?;
        body.message
            .map(|m| m.content)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message"))
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ============ Claude ============

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLAUDE_MAX_TOKENS: u32 = 2048;

pub struct ClaudeBackend {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ClaudeBackend {
    /// The API key is read from `ANTHROPIC_API_KEY`; a missing key only
    /// makes the backend unavailable.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self::with_key(config, api_key)
    }

    fn with_key(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_key,
            model: config.model_name().to_string(),
            client,
        })
    }

    fn request<'a>(&'a self, system: &'a str, turns: &'a [Turn]) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: CLAUDE_MAX_TOKENS,
            system,
            messages: turns.iter().map(chat_message).collect(),
        }
    }
}

fn chat_message(turn: &Turn) -> ChatMessage<'_> {
    ChatMessage {
        role: match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: &turn.content,
    }
}

fn parse_messages_response(body: MessagesResponse) -> Result<String> {
    let text: String = body
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .map(|b| b.text)
        .collect();
    if text.is_empty() {
        bail!("Invalid Claude response: no text content");
    }
    Ok(text)
}

#[async_trait]
impl GenerationBackend for ClaudeBackend {
    fn name(&self) -> &str {
        "claude"
    }

    async fn generate(&self, system: &str, turns: &[Turn], context: &str) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("ANTHROPIC_API_KEY environment variable not set");
        };
        let full_system = system_with_context(system, context);
        let request = self.request(&full_system, turns);

        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Claude API connection error")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Claude API error {}: {}", status, body);
        }

        parse_messages_response(response.json().await?)
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Create the backend named by `config.backend`.
pub fn create_backend(config: &GenerationConfig) -> Result<Box<dyn GenerationBackend>> {
    match config.backend.as_str() {
        "ollama" => Ok(Box::new(OllamaBackend::new(config)?)),
        "claude" => Ok(Box::new(ClaudeBackend::new(config)?)),
        other => bail!("Unknown generation backend: {}", other),
    }
}
