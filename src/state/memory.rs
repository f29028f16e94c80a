//! In-memory state and limit store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::bus::{ConversationId, UserId};
use crate::error::Result;

use super::{ConversationState, LastContact, LimitEntry, LimitStore, LimitSubject, StateStore};

/// Keeps every record in process memory. Each call is atomic on its own;
/// multi-call sequences are not.
#[derive(Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<ConversationId, ConversationState>>,
    limits: RwLock<HashMap<LimitSubject, LimitEntry>>,
    contacts: RwLock<HashMap<ConversationId, HashMap<UserId, DateTime<Utc>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_state(&self, id: &ConversationId) -> Result<ConversationState> {
        if let Some(state) = self.states.read().await.get(id) {
            return Ok(state.clone());
        }
        let mut states = self.states.write().await;
        Ok(states
            .entry(id.clone())
            .or_insert_with(|| ConversationState::new(id.clone()))
            .clone())
    }

    async fn save_state(&self, state: &ConversationState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }
}

#[async_trait]
impl LimitStore for MemoryStore {
    async fn get_limit(&self, subject: &LimitSubject) -> Result<Option<LimitEntry>> {
        Ok(self.limits.read().await.get(subject).cloned())
    }

    async fn put_limit(&self, entry: &LimitEntry) -> Result<()> {
        self.limits
            .write()
            .await
            .insert(entry.subject.clone(), entry.clone());
        Ok(())
    }

    async fn insert_limit_if_absent(&self, entry: LimitEntry) -> Result<LimitEntry> {
        let mut limits = self.limits.write().await;
        Ok(limits
            .entry(entry.subject.clone())
            .or_insert(entry)
            .clone())
    }

    async fn debit_limit(&self, subject: &LimitSubject, amount: i64) -> Result<()> {
        if let Some(entry) = self.limits.write().await.get_mut(subject) {
            entry.remaining_tokens -= amount;
        }
        Ok(())
    }

    async fn touch_contact(
        &self,
        group: &ConversationId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.contacts
            .write()
            .await
            .entry(group.clone())
            .or_default()
            .insert(user.clone(), at);
        Ok(())
    }

    async fn contacts_since(
        &self,
        group: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LastContact>> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .get(group)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, at)| **at >= since)
                    .map(|(user, at)| LastContact {
                        group_id: group.clone(),
                        user_id: user.clone(),
                        last_contacted_at: *at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
