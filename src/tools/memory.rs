//! Memory tools: `remember_fact` and `fetch_info`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::config::PromptsConfig;
use crate::error::Result;
use crate::memory::MemoryService;

use super::types::required_str;
use super::{Tool, ToolContext, ToolExecutionResult};

/// Facts without an explicit subject are filed under the conversation.
fn subject_or_conversation<'a>(args: &'a Value, ctx: &'a ToolContext) -> &'a str {
    args.get("subject")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ctx.conversation_id.as_str())
}

pub struct RememberFactTool {
    memory: Arc<dyn MemoryService>,
    reply: String,
}

impl RememberFactTool {
    pub fn new(memory: Arc<dyn MemoryService>, prompts: &PromptsConfig) -> Self {
        Self {
            memory,
            reply: prompts.fact_saved_result.clone(),
        }
    }
}

#[async_trait]
impl Tool for RememberFactTool {
    fn name(&self) -> &str {
        "remember_fact"
    }

    fn description(&self) -> &str {
        "Remember a fact about a user or this chat for later conversations."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": {
                    "type": "string",
                    "description": "User id the fact is about; omit for the chat itself"
                },
                "fact": {
                    "type": "string",
                    "description": "The fact, as one short sentence"
                }
            },
            "required": ["fact"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolExecutionResult> {
        let fact = required_str(&args, "fact")?;
        let subject = subject_or_conversation(&args, ctx);

        // Saving is not worth failing the turn over.
        if let Err(e) = self.memory.remember(subject, fact).await {
            warn!(conversation = %ctx.conversation_id, error = %e, "Failed to store fact");
        }
        Ok(ToolExecutionResult::text(self.reply.clone()))
    }
}

pub struct FetchInfoTool {
    memory: Arc<dyn MemoryService>,
    not_found: String,
}

impl FetchInfoTool {
    pub fn new(memory: Arc<dyn MemoryService>, prompts: &PromptsConfig) -> Self {
        Self {
            memory,
            not_found: prompts.info_not_found_result.clone(),
        }
    }
}

#[async_trait]
impl Tool for FetchInfoTool {
    fn name(&self) -> &str {
        "fetch_info"
    }

    fn description(&self) -> &str {
        "Recall what you know about a user or this chat."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": {
                    "type": "string",
                    "description": "User id to look up; omit for the chat itself"
                },
                "query": {
                    "type": "string",
                    "description": "What you want to know"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolExecutionResult> {
        let query = required_str(&args, "query")?;
        let subject = subject_or_conversation(&args, ctx);

        let found = self.memory.search(subject, query).await?;
        Ok(ToolExecutionResult::text(
            found.unwrap_or_else(|| self.not_found.clone()),
        ))
    }
}
