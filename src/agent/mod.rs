//! Agent module - what happens inside one conversation run
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌────────────────────┐
//! │ ChatProcessor│────>│ AttentionMachine│───>│ AdmissionController│
//! │              │     └────────────────┘     └────────────────────┘
//! │              │     ┌────────────────┐     ┌────────────────────┐
//! │              │────>│ CompletionLoop │────>│ CompletionProvider │
//! └──────────────┘     └────────────────┘     └────────────────────┘
//!                              │
//!                              ▼
//!                      ┌────────────────┐
//!                      │  ToolRegistry  │
//!                      └────────────────┘
//! ```
//!
//! The processor is the [`ConversationRunner`](crate::dispatcher::ConversationRunner)
//! the dispatcher spawns for each ready batch.

mod r#loop;
mod processor;
pub mod response;

pub use processor::{ChatProcessor, ProcessOutcome};
pub use r#loop::{CompletionLoop, LoopStop, RunContext, RunOutcome};
pub use response::ModelResponse;
