//! Tool types for Murmur
//!
//! The `Tool` trait every built-in tool implements, plus the context and
//! result types exchanged with the completion loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::bus::{ConversationId, ConversationKind};
use crate::error::Result;

/// Which conversations a tool is offered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolScope {
    All,
    GroupOnly,
}

impl ToolScope {
    pub fn allows(self, kind: ConversationKind) -> bool {
        match self {
            ToolScope::All => true,
            ToolScope::GroupOnly => kind == ConversationKind::Group,
        }
    }
}

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionResult {
    /// Sent back to the model as the tool message.
    pub response_text: String,
    /// Ends the completion loop once the current turn's calls are done.
    pub halts_loop: bool,
}

impl ToolExecutionResult {
    pub fn text(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            halts_loop: false,
        }
    }

    pub fn halting(response_text: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            halts_loop: true,
        }
    }
}

/// Trait that all tools must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use murmur::tools::{Tool, ToolContext, ToolExecutionResult};
/// use murmur::error::Result;
///
/// struct Shrug;
///
/// #[async_trait]
/// impl Tool for Shrug {
///     fn name(&self) -> &str { "shrug" }
///     fn description(&self) -> &str { "Shrug" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({"type": "object", "properties": {}})
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolExecutionResult> {
///         Ok(ToolExecutionResult::text("¯\\_(ツ)_/¯"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model calls the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    fn scope(&self) -> ToolScope {
        ToolScope::All
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolExecutionResult>;
}

/// Where and when a tool call happens.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
    pub kind: ConversationKind,
    pub now: DateTime<Utc>,
}

impl ToolContext {
    pub fn new(conversation_id: ConversationId, kind: ConversationKind) -> Self {
        Self {
            conversation_id,
            kind,
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Read a required, non-blank string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| crate::error::MurmurError::Tool(format!("Missing '{}' parameter", key)))
}
