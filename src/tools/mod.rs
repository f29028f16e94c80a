//! Tools module - functions the model may call during a run
//!
//! # Built-in Tools
//!
//! | Tool | Effect | Halts |
//! |---|---|---|
//! | `ignore_message` | counts an ignored turn | yes |
//! | `wait_for_user_end` | counts a listening turn | yes |
//! | `unfocus_chat` | stops following a group | yes |
//! | `think` | echoes the thoughts | no |
//! | `remember_fact` | stores a fact | no |
//! | `fetch_info` | recalls facts | no |

pub mod attention;
pub mod memory;
mod registry;
pub mod think;
mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext, ToolExecutionResult, ToolScope};

use std::sync::Arc;

use crate::config::{AttentionConfig, PromptsConfig};
use crate::memory::MemoryService;
use crate::state::StateStore;

/// Every built-in tool, wired to the given stores.
pub fn builtin_tools(
    states: Arc<dyn StateStore>,
    memory: Arc<dyn MemoryService>,
    attention: &AttentionConfig,
    prompts: &PromptsConfig,
) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(attention::IgnoreMessageTool::new(
            Arc::clone(&states),
            attention,
            prompts,
        )),
        Arc::new(attention::WaitForUserEndTool::new(
            Arc::clone(&states),
            attention,
            prompts,
        )),
        Arc::new(attention::UnfocusChatTool::new(states, prompts)),
        Arc::new(think::ThinkTool),
        Arc::new(memory::RememberFactTool::new(Arc::clone(&memory), prompts)),
        Arc::new(memory::FetchInfoTool::new(memory, prompts)),
    ]
}
