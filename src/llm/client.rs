//! Chat calls that turn a prompt pair into plan text.
//!
//! `CLICKASK_LLM_PROVIDER=anthropic` selects the Messages API. Anything else
//! speaks the OpenAI chat format served by vLLM, Ollama or LiteLLM.

use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::query_plan::PlanError;

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    Anthropic,
    OpenAI,
}

impl LlmProvider {
    fn label(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI-compatible",
        }
    }
}

/// LLM configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub provider: LlmProvider,
}

impl LlmConfig {
    /// Load config from environment.
    ///
    /// OpenAI-compatible endpoints are often self-hosted without auth, so an
    /// empty key is accepted there. Returns `None` only for the Anthropic
    /// provider without `CLICKASK_LLM_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let provider_str = std::env::var("CLICKASK_LLM_PROVIDER")
            .unwrap_or_default()
            .to_lowercase();
        let api_key = std::env::var("CLICKASK_LLM_API_KEY").unwrap_or_default();

        let (provider, default_model, default_url) = match provider_str.as_str() {
            "anthropic" => {
                if api_key.is_empty() {
                    return None;
                }
                (
                    LlmProvider::Anthropic,
                    "claude-sonnet-4-20250514",
                    "https://api.anthropic.com/v1/messages",
                )
            }
            _ => (
                LlmProvider::OpenAI,
                "meta-llama/Llama-3.1-8B-Instruct",
                "http://localhost:8001/v1/chat/completions",
            ),
        };

        Some(Self {
            api_key,
            model: std::env::var("CLICKASK_LLM_MODEL").unwrap_or_else(|_| default_model.to_string()),
            api_url: std::env::var("CLICKASK_LLM_API_URL")
                .unwrap_or_else(|_| default_url.to_string()),
            max_tokens: std::env::var("CLICKASK_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(512),
            temperature: std::env::var("CLICKASK_LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            provider,
        })
    }
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

/// One request body for both formats; only Anthropic takes a top-level `system`.
#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Turn<'a>>,
}

impl LlmConfig {
    fn chat_body<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> ChatBody<'a> {
        let user = Turn {
            role: "user",
            content: user_prompt,
        };
        let (system, messages) = match self.provider {
            LlmProvider::Anthropic => (Some(system_prompt), vec![user]),
            LlmProvider::OpenAI => (
                None,
                vec![
                    Turn {
                        role: "system",
                        content: system_prompt,
                    },
                    user,
                ],
            ),
        };
        ChatBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider {
            LlmProvider::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            LlmProvider::OpenAI if self.api_key.is_empty() => request,
            LlmProvider::OpenAI => request.bearer_auth(&self.api_key),
        }
    }
}

/// Concatenated reply text: `content[].text` for Anthropic,
/// `choices[].message.content` otherwise.
fn reply_text(provider: &LlmProvider, reply: &Value) -> String {
    let parts: Vec<&str> = match provider {
        LlmProvider::Anthropic => reply["content"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|block| block["text"].as_str())
            .collect(),
        LlmProvider::OpenAI => reply["choices"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|choice| choice["message"]["content"].as_str())
            .collect(),
    };
    parts.concat()
}

pub async fn call_llm(
    client: &Client,
    config: &LlmConfig,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String, PlanError> {
    let label = config.provider.label();
    let response = config
        .authorize(client.post(&config.api_url))
        .json(&config.chat_body(system_prompt, user_prompt))
        .send()
        .await
        .map_err(|e| PlanError::Request(format!("{} request failed: {}", label, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlanError::Request(format!(
            "{} endpoint answered {}: {}",
            label, status, body
        )));
    }

    let reply: Value = response
        .json()
        .await
        .map_err(|e| PlanError::Request(format!("{} reply is not JSON: {}", label, e)))?;
    let text = reply_text(&config.provider, &reply);
    if text.trim().is_empty() {
        return Err(PlanError::Request(format!("{} reply has no text", label)));
    }
    Ok(text)
}
