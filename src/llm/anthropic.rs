use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::sse::{SseDecoder, StreamItem, parse_event};
use super::{DeltaStream, TextGenerator};
use crate::config::LlmSection;
use crate::errors::LlmError;

/// Default Messages API endpoint
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Text generator backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicGenerator {
    /// Build from config, reading the key from the configured variable.
    pub fn from_config(section: &LlmSection) -> Result<Self, LlmError> {
        Self::from_config_with(section, |key| std::env::var(key).ok())
    }

    /// Build from config with an explicit variable lookup.
    pub fn from_config_with<F>(section: &LlmSection, lookup: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&section.api_key_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingCredential {
                env_var: section.api_key_env.clone(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(LlmError::Transport)?;

        Ok(Self {
            client,
            url: section
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: section.model.clone(),
            max_tokens: section.max_tokens,
            temperature: section.temperature,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": stream,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: crate::util::truncate_chars(&body, 500),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate_structured(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Structured request");
        let response = self.send(&self.request_body(prompt, false)).await?;
        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<DeltaStream, LlmError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Streaming request");
        let response = self.send(&self.request_body(prompt, true)).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(LlmError::Transport)?;
                for data in decoder.push(&chunk) {
                    match parse_event(&data)? {
                        StreamItem::Text(text) => yield text,
                        StreamItem::Stop => break 'outer,
                        StreamItem::Ignore => {}
                    }
                }
            }
            if let Some(data) = decoder.finish() {
                let item = parse_event(&data)?;
                if let StreamItem::Text(text) = item {
                    yield text;
                }
            }
        };

        Ok(stream.boxed())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
