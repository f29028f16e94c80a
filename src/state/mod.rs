//! State module - conversation state and budget records
//!
//! The engine reads these fresh at the start of every run and writes them
//! back through the store traits below; it never caches them across runs.

mod memory;
mod types;

pub use memory::MemoryStore;
pub use types::{AttentionPhase, ConversationState, LastContact, LimitEntry, LimitSubject};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bus::{ConversationId, UserId};
use crate::error::Result;

/// Get-or-create and commit for [`ConversationState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state, creating a default (unfocused) one on first access.
    async fn load_state(&self, id: &ConversationId) -> Result<ConversationState>;

    async fn save_state(&self, state: &ConversationState) -> Result<()>;
}

/// Budget rows and group contact bookkeeping.
#[async_trait]
pub trait LimitStore: Send + Sync {
    async fn get_limit(&self, subject: &LimitSubject) -> Result<Option<LimitEntry>>;

    async fn put_limit(&self, entry: &LimitEntry) -> Result<()>;

    /// Insert `entry` unless the subject already has one; return what is stored.
    async fn insert_limit_if_absent(&self, entry: LimitEntry) -> Result<LimitEntry>;

    /// Atomically subtract `amount`. Missing subjects are left alone.
    async fn debit_limit(&self, subject: &LimitSubject, amount: i64) -> Result<()>;

    async fn touch_contact(
        &self,
        group: &ConversationId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Members of `group` contacted at or after `since`.
    async fn contacts_since(
        &self,
        group: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LastContact>>;
}
