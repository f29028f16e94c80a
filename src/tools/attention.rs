//! Tools that let the model steer its own attention.
//!
//! All three end the completion loop after the turn they are called in.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::attention::effects;
use crate::config::{AttentionConfig, PromptsConfig};
use crate::error::Result;
use crate::state::StateStore;

use super::{Tool, ToolContext, ToolExecutionResult, ToolScope};

fn no_params() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// `ignore_message`: the batch was not meant for the agent.
pub struct IgnoreMessageTool {
    states: Arc<dyn StateStore>,
    streak_limit: u32,
    reply: String,
}

impl IgnoreMessageTool {
    pub fn new(states: Arc<dyn StateStore>, config: &AttentionConfig, prompts: &PromptsConfig) -> Self {
        Self {
            states,
            streak_limit: config.ignoring_streak_limit,
            reply: prompts.ignored_result.clone(),
        }
    }
}

#[async_trait]
impl Tool for IgnoreMessageTool {
    fn name(&self) -> &str {
        "ignore_message"
    }

    fn description(&self) -> &str {
        "Ignore the latest messages when they are not addressed to you."
    }

    fn parameters(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolExecutionResult> {
        let mut state = self.states.load_state(&ctx.conversation_id).await?;
        state.listening_streak = 0;
        effects::record_ignored(&mut state, self.streak_limit);
        info!(
            conversation = %ctx.conversation_id,
            streak = state.ignoring_streak,
            "Messages ignored"
        );
        self.states.save_state(&state).await?;
        Ok(ToolExecutionResult::halting(self.reply.clone()))
    }
}

/// `wait_for_user_end`: the speaker has not finished their thought.
pub struct WaitForUserEndTool {
    states: Arc<dyn StateStore>,
    listening_limit: u32,
    waiting: String,
    waited_too_long: String,
}

impl WaitForUserEndTool {
    pub fn new(states: Arc<dyn StateStore>, config: &AttentionConfig, prompts: &PromptsConfig) -> Self {
        Self {
            states,
            listening_limit: config.listening_streak_limit,
            waiting: prompts.waiting_result.clone(),
            waited_too_long: prompts.waited_too_long_result.clone(),
        }
    }
}

#[async_trait]
impl Tool for WaitForUserEndTool {
    fn name(&self) -> &str {
        "wait_for_user_end"
    }

    fn description(&self) -> &str {
        "Wait for the user to finish writing before answering."
    }

    fn parameters(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolExecutionResult> {
        let mut state = self.states.load_state(&ctx.conversation_id).await?;
        let streak = effects::record_listening(&mut state);
        self.states.save_state(&state).await?;
        info!(conversation = %ctx.conversation_id, streak, "Listening");

        let reply = if streak >= self.listening_limit {
            &self.waited_too_long
        } else {
            &self.waiting
        };
        Ok(ToolExecutionResult::halting(reply.clone()))
    }
}

/// `unfocus_chat`: stop following a group until addressed again.
pub struct UnfocusChatTool {
    states: Arc<dyn StateStore>,
    reply: String,
}

impl UnfocusChatTool {
    pub fn new(states: Arc<dyn StateStore>, prompts: &PromptsConfig) -> Self {
        Self {
            states,
            reply: prompts.unfocused_result.clone(),
        }
    }
}

#[async_trait]
impl Tool for UnfocusChatTool {
    fn name(&self) -> &str {
        "unfocus_chat"
    }

    fn description(&self) -> &str {
        "Stop following this group chat until somebody mentions you."
    }

    fn parameters(&self) -> Value {
        no_params()
    }

    fn scope(&self) -> ToolScope {
        ToolScope::GroupOnly
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolExecutionResult> {
        let mut state = self.states.load_state(&ctx.conversation_id).await?;
        effects::unfocus(&mut state);
        self.states.save_state(&state).await?;
        info!(conversation = %ctx.conversation_id, "Unfocused on request");
        Ok(ToolExecutionResult::halting(self.reply.clone()))
    }
}
