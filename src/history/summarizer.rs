//! History summarization.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::providers::{CompletionProvider, CompletionRequest};

use super::compaction::transcript;
use super::Message;

/// Condenses a run of messages into a short text.
///
/// An empty string means "no summary available"; callers then leave the
/// history as it is.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Summarizer backed by the completion service.
pub struct ProviderSummarizer {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    instruction: String,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: &str, instruction: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            instruction: instruction.to_string(),
        }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let text = transcript(messages);
        if text.is_empty() {
            return Ok(String::new());
        }
        let request = CompletionRequest::new(
            &self.model,
            vec![Message::system(&self.instruction), Message::user(&text)],
        );

        match self.provider.complete(request).await {
            Ok(response) => {
                let Some(choice) = response.choices.into_iter().next() else {
                    return Ok(String::new());
                };
                if choice.message.refusal.is_some() {
                    warn!(provider = self.provider.name(), "Summary refused");
                    return Ok(String::new());
                }
                Ok(choice.message.content.trim().to_string())
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Summary failed");
                Ok(String::new())
            }
        }
    }
}
