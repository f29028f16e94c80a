//! Providers module - completion services
//!
//! Defines the `CompletionProvider` trait, its request/response types, and
//! an OpenAI-compatible HTTP implementation.

pub mod openai;
mod types;

use crate::error::ProviderError;

pub use openai::OpenAICompatProvider;
pub use types::{
    Choice, CompletionProvider, CompletionRequest, CompletionResponse, ResponseSchema,
    ToolDefinition, Usage,
};

/// Body fragments that mark a 400 as "request too large or unsupported".
const OVERSIZED_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "maximum context length",
    "too many tokens",
    "request too large",
    "image_url is only supported",
    "invalid image",
    "unsupported image",
];

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        413 => ProviderError::ContextTooLarge(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => {
            let lower = body.to_lowercase();
            if OVERSIZED_PATTERNS.iter().any(|p| lower.contains(p)) {
                ProviderError::ContextTooLarge(body.to_string())
            } else {
                ProviderError::InvalidRequest(body.to_string())
            }
        }
        503 => ProviderError::Overloaded(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
