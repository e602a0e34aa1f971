//! AI summarization collaborators.
//!
//! The queue calls [`Summarizer::summarize`] once per chunk of extracted text
//! and once more to merge partial summaries when a document was chunked.
//!
//! # Providers
//!
//! | Provider | Config value | Requirements |
//! |----------|-------------|--------------|
//! | Disabled | `"disabled"` | None (every call fails) |
//! | OpenAI | `"openai"` | `OPENAI_API_KEY` env var, `ai.model` |

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::{Result, VaultError};

const SERVICE: &str = "summarizer";

const SYSTEM_PROMPT: &str = "You summarize course material for a student's study notes. \
Write a concise markdown summary covering the key concepts, definitions and takeaways. \
Do not invent facts that are not in the text.";

const MERGE_PROMPT: &str = "The following are summaries of consecutive parts of one document. \
Merge them into a single coherent markdown summary without repeating points.";

/// A summary and the tokens the provider reported for producing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub tokens: u64,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize one chunk of source text.
    async fn summarize(&self, chunk: &str) -> Result<Summary>;

    /// Merge per-chunk summaries into one document summary.
    ///
    /// The default re-summarizes the concatenation.
    async fn synthesize(&self, partials: &[String]) -> Result<Summary> {
        self.summarize(&partials.join("\n\n")).await
    }
}

/// Build the summarizer selected by `[ai]`.
pub fn create_summarizer(config: &AiConfig) -> Result<Box<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSummarizer)),
        "openai" => Ok(Box::new(OpenAiSummarizer::new(config)?)),
        other => Err(VaultError::Configuration(format!(
            "unknown AI provider: {}",
            other
        ))),
    }
}

// ============ Disabled Provider ============

/// Used when `ai.provider = "disabled"`. Every call fails, so queue items
/// stop at the summary stage with a clear message.
#[derive(Debug, Clone, Default)]
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _chunk: &str) -> Result<Summary> {
        Err(VaultError::external(
            SERVICE,
            "AI summarization is disabled (set ai.provider in the config)",
        ))
    }
}

// ============ OpenAI Provider ============

/// Chat-completions summarizer.
///
/// Retries rate limits (429), server errors and network failures with
/// exponential backoff; other client errors fail immediately.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
}

impl OpenAiSummarizer {
    /// # Errors
    ///
    /// [`VaultError::Configuration`] when `ai.model` or `OPENAI_API_KEY` is
    /// missing.
    pub fn new(config: &AiConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            VaultError::Configuration("ai.model required for OpenAI provider".to_string())
        })?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            VaultError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VaultError::external(SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: config.endpoint.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, system: &str, user: &str) -> Result<Summary> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| VaultError::external(SERVICE, e.to_string()))?;
                        return parse_completion(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = VaultError::external(
                        SERVICE,
                        format!("OpenAI API error {}: {}", status, body_text),
                    );
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(attempt, %status, "summarization request failed, retrying");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "summarization request failed, retrying");
                    last_err = Some(VaultError::external(SERVICE, e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| VaultError::external(SERVICE, "max retries exceeded")))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, chunk: &str) -> Result<Summary> {
        debug!(model = %self.model, characters = chunk.len(), "summarizing chunk");
        self.complete(SYSTEM_PROMPT, chunk).await
    }

    async fn synthesize(&self, partials: &[String]) -> Result<Summary> {
        debug!(model = %self.model, parts = partials.len(), "merging partial summaries");
        self.complete(MERGE_PROMPT, &partials.join("\n\n---\n\n")).await
    }
}

/// Pull the message text and total token usage out of a chat-completions
/// response.
fn parse_completion(json: &serde_json::Value) -> Result<Summary> {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| VaultError::external(SERVICE, "response has no message content"))?
        .trim()
        .to_string();
    let tokens = json["usage"]["total_tokens"].as_u64().unwrap_or(0);
    Ok(Summary { text, tokens })
}
