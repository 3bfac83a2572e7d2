//! Text-generation capability.
//!
//! The pipeline only ever talks to [`TextGenerator`]; the Anthropic
//! Messages backend lives in [`anthropic`] and its SSE decoding in [`sse`].

pub mod anthropic;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::LlmError;

pub use anthropic::AnthropicGenerator;

/// Stream of raw text increments from one generation call.
pub type DeltaStream = BoxStream<'static, Result<String, LlmError>>;

/// A model that turns prompts into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single-shot generation, returns the full response text.
    async fn generate_structured(&self, prompt: &str) -> Result<String, LlmError>;

    /// Incremental generation. The stream ends when the model stops.
    async fn generate_stream(&self, prompt: &str) -> Result<DeltaStream, LlmError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}
