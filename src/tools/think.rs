use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;

use super::types::required_str;
use super::{Tool, ToolContext, ToolExecutionResult};

/// `think`: a scratchpad. The thoughts are echoed back unchanged.
pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Think step by step before answering. Nobody else sees these thoughts."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thoughts": {
                    "type": "string",
                    "description": "Your reasoning"
                }
            },
            "required": ["thoughts"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolExecutionResult> {
        let thoughts = required_str(&args, "thoughts")?;
        Ok(ToolExecutionResult::text(thoughts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ConversationKind;

    #[tokio::test]
    async fn test_think_echoes() {
        let ctx = ToolContext::new("c".into(), ConversationKind::Private);
        let result = ThinkTool
            .execute(json!({"thoughts": "they asked twice"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.response_text, "they asked twice");
        assert!(!result.halts_loop);
    }

    #[tokio::test]
    async fn test_think_rejects_parse_error_args() {
        let ctx = ToolContext::new("c".into(), ConversationKind::Private);
        let result = ThinkTool
            .execute(json!({"_parse_error": "{oops"}), &ctx)
            .await;
        assert!(result.is_err());
    }
}
