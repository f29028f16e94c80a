//! Tool registry for Murmur
//!
//! A closed set of tools, fixed at startup. Calling a name that is not
//! registered is a programming error, not a model mistake.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::bus::ConversationKind;
use crate::error::{MurmurError, Result};
use crate::providers::ToolDefinition;

use super::{Tool, ToolContext, ToolExecutionResult};

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, so definitions go out in a stable order.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Build the registry. Duplicate names are rejected.
    pub fn build(tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = Self {
            tools: HashMap::new(),
            order: Vec::new(),
        };
        for tool in tools {
            let name = tool.name().to_string();
            if registry.tools.contains_key(&name) {
                return Err(MurmurError::Config(format!(
                    "Tool '{}' registered twice",
                    name
                )));
            }
            info!(tool = %name, "Registering tool");
            registry.order.push(name.clone());
            registry.tools.insert(name, tool);
        }
        Ok(registry)
    }

    /// Fail unless every declared tool has an implementation.
    pub fn validate_catalog(&self, catalog: &[String]) -> Result<()> {
        let missing: Vec<&str> = catalog
            .iter()
            .filter(|name| !self.tools.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MurmurError::Config(format!(
                "Declared tools without implementation: {}",
                missing.join(", ")
            )))
        }
    }

    /// Drop every tool not named in `catalog`.
    pub fn retain(&mut self, catalog: &[String]) {
        self.order.retain(|name| catalog.contains(name));
        self.tools.retain(|name, _| catalog.contains(name));
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Definitions offered to the model in a conversation of `kind`.
    pub fn definitions_for(&self, kind: ConversationKind) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .filter(|tool| tool.scope().allows(kind))
            .map(|tool| ToolDefinition::new(tool.name(), tool.description(), tool.parameters()))
            .collect()
    }

    /// Execute `name`. Tool failures are returned as errors for the caller to
    /// turn into a result the model can read.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolExecutionResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| MurmurError::Tool(format!("Tool not registered: {}", name)))?;
        if !tool.scope().allows(ctx.kind) {
            return Err(MurmurError::Tool(format!(
                "Tool '{}' is not available in {:?} conversations",
                name, ctx.kind
            )));
        }

        let start = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(result) => {
                info!(
                    tool = name,
                    conversation = %ctx.conversation_id,
                    halts_loop = result.halts_loop,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                Ok(result)
            }
            Err(e) => {
                error!(
                    tool = name,
                    conversation = %ctx.conversation_id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolScope;
    use async_trait::async_trait;
    use serde_json::json;

    struct Named(&'static str, ToolScope);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn scope(&self) -> ToolScope {
            self.1
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolExecutionResult> {
            Ok(ToolExecutionResult::text(self.0))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::build(vec![
            Arc::new(Named("think", ToolScope::All)),
            Arc::new(Named("unfocus_chat", ToolScope::GroupOnly)),
        ])
        .unwrap()
    }

    fn ctx() -> ToolContext {
        ToolContext::new("c".into(), ConversationKind::Private)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ToolRegistry::build(vec![
            Arc::new(Named("think", ToolScope::All)),
            Arc::new(Named("think", ToolScope::All)),
        ]);
        assert!(matches!(result, Err(MurmurError::Config(_))));
    }

    #[test]
    fn test_definitions_filtered_by_kind() {
        let registry = registry();
        let private = registry.definitions_for(ConversationKind::Private);
        let group = registry.definitions_for(ConversationKind::Group);

        assert_eq!(private.len(), 1);
        assert_eq!(private[0].name, "think");
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_catalog_validation() {
        let registry = registry();
        assert!(registry.validate_catalog(&["think".to_string()]).is_ok());

        let err = registry
            .validate_catalog(&["think".to_string(), "kick_user".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("kick_user"));
    }

    #[test]
    fn test_retain_limits_catalog() {
        let mut registry = registry();
        registry.retain(&["think".to_string()]);
        assert!(!registry.has("unfocus_chat"));
        assert_eq!(registry.names(), vec!["think"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let result = registry().execute("nope", json!({}), &ctx()).await;
        assert!(matches!(result, Err(MurmurError::Tool(_))));
    }

    #[tokio::test]
    async fn test_group_only_tool_rejected_in_private_chat() {
        let registry = registry();
        let result = registry.execute("unfocus_chat", json!({}), &ctx()).await;
        assert!(matches!(result, Err(MurmurError::Tool(_))));

        let group = ToolContext::new("g".into(), ConversationKind::Group);
        let result = registry.execute("unfocus_chat", json!({}), &group).await.unwrap();
        assert_eq!(result.response_text, "unfocus_chat");
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_name() {
        let result = registry().execute("think", json!({}), &ctx()).await.unwrap();
        assert_eq!(result.response_text, "think");
    }
}
