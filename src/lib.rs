//! Murmur - chat orchestration engine
//!
//! Debounces inbound chat messages per conversation, runs at most one
//! completion loop per conversation at a time, and decides through attention
//! and token-budget policy whether the model is engaged at all.

pub mod agent;
pub mod attention;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod history;
pub mod limits;
pub mod memory;
pub mod providers;
pub mod queue;
pub mod state;
pub mod tools;
pub mod utils;

pub use bus::{ConversationId, ConversationKind, InboundMessage, MessageBus, OutboundMessage, UserId};
pub use config::Config;
pub use engine::{Engine, EngineBuilder};
pub use error::{MurmurError, ProviderError, Result};
pub use providers::{CompletionProvider, CompletionRequest, CompletionResponse, Usage};
