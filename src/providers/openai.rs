//! OpenAI-compatible completion provider
//!
//! Speaks the Chat Completions API: message conversion (including image
//! parts), tool calls, structured-output schemas, refusals and cached-token
//! usage.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{MurmurError, Result};
use crate::history::{Message, Role, ToolCall};

use super::{
    parse_provider_error, Choice, CompletionProvider, CompletionRequest, CompletionResponse,
    ToolDefinition, Usage,
};

// ============================================================================
// API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_kind")]
    r#type: String,
    function: ApiFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    r#type: &'static str,
    function: ApiFunctionDef,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
    prompt_tokens_details: Option<ApiPromptDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiPromptDetails {
    cached_tokens: Option<u32>,
}

// ============================================================================
// Provider
// ============================================================================

/// Completion provider for OpenAI and API-compatible endpoints.
pub struct OpenAICompatProvider {
    api_key: String,
    api_base: String,
    client: Client,
}

impl OpenAICompatProvider {
    /// Build from config. Fails when no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| MurmurError::Config("provider.api_key is not set".into()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(&api_key, &config.api_base, client))
    }

    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_messages(messages: Vec<Message>) -> Vec<ApiMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls = msg.tool_calls.filter(|tcs| !tcs.is_empty()).map(|tcs| {
                tcs.into_iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id,
                        r#type: function_kind(),
                        function: ApiFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect::<Vec<_>>()
            });

            let content = if !msg.images.is_empty() {
                let mut parts = vec![ApiContentPart::Text { text: msg.content }];
                parts.extend(msg.images.into_iter().map(|url| ApiContentPart::ImageUrl {
                    image_url: ApiImageUrl { url },
                }));
                Some(ApiContent::Parts(parts))
            } else if msg.content.is_empty() && tool_calls.is_some() {
                None
            } else if msg.content.is_empty() {
                msg.refusal.map(ApiContent::Text)
            } else {
                Some(ApiContent::Text(msg.content))
            };

            ApiMessage {
                role,
                content,
                tool_calls,
                tool_call_id: msg.tool_call_id,
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<ApiTool> {
    tools
        .into_iter()
        .map(|t| ApiTool {
            r#type: "function",
            function: ApiFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

fn convert_response(response: ApiResponse) -> CompletionResponse {
    let choices = response
        .choices
        .into_iter()
        .map(|c| {
            let tool_calls: Vec<ToolCall> = c
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
                .collect();
            let mut message = Message::assistant(&c.message.content.unwrap_or_default());
            if !tool_calls.is_empty() {
                message.tool_calls = Some(tool_calls);
            }
            message.refusal = c.message.refusal;
            Choice { message }
        })
        .collect();

    let usage = response.usage.map(|u| {
        let mut usage = Usage::new(u.prompt_tokens, u.completion_tokens);
        if let Some(total) = u.total_tokens {
            usage.total_tokens = total;
        }
        usage.cached_tokens = u.prompt_tokens_details.and_then(|d| d.cached_tokens);
        usage
    });

    CompletionResponse { choices, usage }
}

// ============================================================================
// CompletionProvider Implementation
// ============================================================================

#[async_trait]
impl CompletionProvider for OpenAICompatProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response_format = request.response_schema.map(|s| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {"name": s.name, "schema": s.schema, "strict": true}
            })
        });
        let body = ApiRequest {
            model: request.model.clone(),
            messages: convert_messages(request.messages),
            tools: (!request.tools.is_empty()).then(|| convert_tools(request.tools)),
            response_format,
        };

        debug!(model = %request.model, "Completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MurmurError::from(crate::error::ProviderError::Timeout(e.to_string()))
                } else {
                    MurmurError::Provider(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_provider_error(status.as_u16(), &text).into());
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| MurmurError::Provider(format!("failed to parse response: {}", e)))?;

        Ok(convert_response(parsed))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_key() {
        let config = ProviderConfig::default();
        assert!(matches!(
            OpenAICompatProvider::from_config(&config),
            Err(MurmurError::Config(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenAICompatProvider::with_client("k", "https://x.local/v1/", Client::new());
        assert_eq!(provider.api_base, "https://x.local/v1");
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_convert_messages_with_images() {
        let messages =
            vec![Message::user("look").with_images(vec!["https://img/1.png".to_string()])];
        let json = serde_json::to_value(convert_messages(messages)).unwrap();
        let parts = json[0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "https://img/1.png");
    }

    #[test]
    fn test_convert_messages_tool_round() {
        let messages = vec![
            Message::assistant_with_tools("", vec![ToolCall::new("c1", "think", "{}")]),
            Message::tool_result("c1", "ok"),
        ];
        let json = serde_json::to_value(convert_messages(messages)).unwrap();
        assert!(json[0].get("content").is_none());
        assert_eq!(json[0]["tool_calls"][0]["type"], "function");
        assert_eq!(json[1]["role"], "tool");
        assert_eq!(json[1]["tool_call_id"], "c1");
    }

    #[test]
    fn test_convert_response_with_cached_usage() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": "{\"text\":[\"hi\"]}", "refusal": null}}],
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 10,
                "total_tokens": 110,
                "prompt_tokens_details": {"cached_tokens": 64}
            }
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let response = convert_response(parsed);
        assert_eq!(response.choices.len(), 1);
        let usage = response.usage.unwrap();
        assert_eq!(usage.cached_tokens, Some(64));
        assert_eq!(usage.total_tokens, 110);
    }

    #[test]
    fn test_convert_response_refusal_and_tools() {
        let raw = serde_json::json!({
            "choices": [{"message": {
                "content": null,
                "refusal": "no",
                "tool_calls": [{"id": "c", "type": "function",
                                "function": {"name": "think", "arguments": "{}"}}]
            }}]
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let msg = &convert_response(parsed).choices[0].message;
        assert_eq!(msg.refusal.as_deref(), Some("no"));
        assert!(msg.has_tool_calls());
    }
}
