//! Debounced per-conversation ingestion queue.
//!
//! Bursts of inbound messages accumulate per conversation until the batch is
//! either large enough or quiet for a randomized interval. All operations are
//! synchronous; the lock is never held across an await point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::bus::{ConversationId, ConversationKind, InboundMessage};
use crate::config::QueueConfig;

/// Snapshot of a conversation's unconsumed messages.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub conversation_id: ConversationId,
    pub kind: ConversationKind,
    pub messages: Vec<InboundMessage>,
    pub last_updated_at: Instant,
}

impl PendingBatch {
    /// Whether any message in the batch addresses the agent.
    pub fn addresses_agent(&self) -> bool {
        self.messages.iter().any(InboundMessage::addresses_agent)
    }

    /// The participant the run is on behalf of: the last sender who
    /// addressed the agent, else the last sender.
    pub fn requester(&self) -> Option<&InboundMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.addresses_agent())
            .or_else(|| self.messages.last())
    }
}

struct Inner {
    entries: HashMap<ConversationId, PendingBatch>,
    rng: StdRng,
}

/// The debounced queue.
pub struct ChatQueue {
    count_limit: usize,
    lower: Duration,
    upper: Duration,
    inner: Mutex<Inner>,
}

impl ChatQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Queue with a caller-supplied jitter source.
    pub fn with_rng(config: &QueueConfig, rng: StdRng) -> Self {
        Self {
            count_limit: config.count_limit,
            lower: config.time_limit_lower_bound(),
            upper: config.time_limit_upper_bound().max(config.time_limit_lower_bound()),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                rng,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append messages, creating the entry if absent, and refresh its timestamp.
    pub fn add(&self, id: &ConversationId, kind: ConversationKind, messages: Vec<InboundMessage>) {
        let now = Instant::now();
        let mut inner = self.lock();
        let entry = inner
            .entries
            .entry(id.clone())
            .or_insert_with(|| PendingBatch {
                conversation_id: id.clone(),
                kind,
                messages: Vec::new(),
                last_updated_at: now,
            });
        entry.messages.extend(messages);
        entry.last_updated_at = now;
    }

    /// Snapshot copies of every non-empty entry that is ready.
    ///
    /// Ready means more than `count_limit` messages, or quiet for longer than
    /// a threshold drawn uniformly from `[lower, upper]` on every check.
    pub fn fetch_ready(&self) -> Vec<PendingBatch> {
        let now = Instant::now();
        let (lower, upper) = (self.lower.as_millis() as u64, self.upper.as_millis() as u64);
        let mut inner = self.lock();
        let Inner { entries, rng } = &mut *inner;

        entries
            .values()
            .filter(|entry| !entry.messages.is_empty())
            .filter(|entry| {
                if entry.messages.len() > self.count_limit {
                    return true;
                }
                let threshold = Duration::from_millis(rng.gen_range(lower..=upper));
                now.duration_since(entry.last_updated_at) > threshold
            })
            .cloned()
            .collect()
    }

    /// Empty an entry's message list. The entry itself stays.
    pub fn clear(&self, id: &ConversationId) {
        if let Some(entry) = self.lock().entries.get_mut(id) {
            entry.messages.clear();
        }
    }

    /// Remove exactly the messages `batch` snapshotted, keeping anything that
    /// arrived after the snapshot was taken.
    pub fn commit(&self, batch: &PendingBatch) {
        if let Some(entry) = self.lock().entries.get_mut(&batch.conversation_id) {
            let taken = batch.messages.len().min(entry.messages.len());
            entry.messages.drain(..taken);
        }
    }

    /// Evict empty entries idle for longer than `idle_ttl`. Returns the count.
    pub fn sweep(&self, idle_ttl: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| {
            !entry.messages.is_empty() || now.duration_since(entry.last_updated_at) <= idle_ttl
        });
        let evicted = before - inner.entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = inner.entries.len(), "Queue swept");
        }
        evicted
    }

    /// Number of tracked conversations, empty entries included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unconsumed messages for one conversation.
    pub fn pending_count(&self, id: &ConversationId) -> usize {
        self.lock()
            .entries
            .get(id)
            .map(|e| e.messages.len())
            .unwrap_or(0)
    }
}
