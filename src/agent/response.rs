//! Structured final answer the model must produce.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::providers::ResponseSchema;

/// `{"text": [...], "sticker": null}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Chat bubbles, sent in order.
    #[serde(default)]
    pub text: Vec<String>,
    /// Optional sticker keyword or emoji.
    #[serde(default)]
    pub sticker: Option<String>,
}

impl ModelResponse {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Blank bubbles are dropped.
    pub fn texts(&self) -> Vec<String> {
        self.text
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether anything would reach the chat.
    pub fn is_visible(&self) -> bool {
        !self.texts().is_empty() || self.sticker.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Strict JSON schema sent with every completion request.
    pub fn schema() -> ResponseSchema {
        ResponseSchema {
            name: "model_response".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "sticker": {
                        "type": ["string", "null"]
                    }
                },
                "required": ["text", "sticker"],
                "additionalProperties": false
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_visible_response() {
        let r = ModelResponse::parse(r#"{"text": ["hi", "  "], "sticker": null}"#).unwrap();
        assert!(r.is_visible());
        assert_eq!(r.texts(), vec!["hi"]);
    }

    #[test]
    fn test_empty_response_is_invisible() {
        let r = ModelResponse::parse(r#"{"text": [], "sticker": null}"#).unwrap();
        assert!(!r.is_visible());
    }

    #[test]
    fn test_sticker_only_is_visible() {
        let r = ModelResponse::parse(r#"{"text": [], "sticker": "wave"}"#).unwrap();
        assert!(r.is_visible());
    }

    #[test]
    fn test_plain_text_is_invalid() {
        assert!(ModelResponse::parse("hello there").is_err());
    }
}
