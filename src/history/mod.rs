//! History module - persisted conversation history
//!
//! The [`HistoryStore`] trait is the contract the engine consumes; the
//! in-memory [`MemoryHistoryStore`] backs tests and the console binary.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use murmur::history::{HistoryStore, MemoryHistoryStore, Message, NoopSummarizer};
//! use murmur::ConversationId;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryHistoryStore::new(Arc::new(NoopSummarizer));
//! let id = ConversationId::from("chat-1");
//! store.append_messages(&id, vec![Message::user("hi")]).await.unwrap();
//! assert_eq!(store.fetch_messages(&id).await.unwrap().len(), 1);
//! # });
//! ```

pub mod compaction;
mod summarizer;
mod types;

pub use compaction::CompactionMode;
pub use summarizer::{ProviderSummarizer, Summarizer};
pub use types::{Message, Role, ToolCall};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::bus::ConversationId;
use crate::error::Result;

/// Persisted message history, one ordered list per conversation.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn fetch_messages(&self, id: &ConversationId) -> Result<Vec<Message>>;

    async fn append_messages(&self, id: &ConversationId, messages: Vec<Message>) -> Result<()>;

    /// Shrink the stored history of `id` by summarizing part of it.
    async fn summarize_and_collapse(&self, id: &ConversationId, mode: CompactionMode)
        -> Result<()>;
}

/// Summarizer that never produces a summary.
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize(&self, _messages: &[Message]) -> Result<String> {
        Ok(String::new())
    }
}

/// In-memory history store.
pub struct MemoryHistoryStore {
    histories: RwLock<HashMap<ConversationId, Vec<Message>>>,
    summarizer: Arc<dyn Summarizer>,
}

impl MemoryHistoryStore {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            summarizer,
        }
    }

    /// Number of conversations with stored history.
    pub async fn conversation_count(&self) -> usize {
        self.histories.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn fetch_messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
        Ok(self
            .histories
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_messages(&self, id: &ConversationId, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut histories = self.histories.write().await;
        histories.entry(id.clone()).or_default().extend(messages);
        Ok(())
    }

    async fn summarize_and_collapse(
        &self,
        id: &ConversationId,
        mode: CompactionMode,
    ) -> Result<()> {
        // Summarize outside the lock; appends only ever touch the tail, so
        // the prefix [..cut] is still the same messages when we write back.
        let snapshot = self.fetch_messages(id).await?;
        if snapshot.is_empty() {
            return Ok(());
        }

        let (cut, source) = match mode {
            CompactionMode::Shorten => {
                let cut = compaction::shorten_cut(&snapshot);
                let head = snapshot[..cut].to_vec();
                (cut, head)
            }
            CompactionMode::ShortenWithoutMedia => {
                let cut = snapshot.len();
                (cut, compaction::text_only(snapshot))
            }
        };
        if cut == 0 {
            return Ok(());
        }

        let summary = self.summarizer.summarize(&source).await?;

        let mut histories = self.histories.write().await;
        let Some(current) = histories.get_mut(id) else {
            return Ok(());
        };
        let cut = cut.min(current.len());
        if summary.is_empty() {
            if mode == CompactionMode::ShortenWithoutMedia {
                let tail = current.split_off(cut);
                let mut kept = compaction::text_only(std::mem::take(current));
                kept.extend(tail);
                *current = kept;
                debug!(conversation = %id, "Dropped media without summary");
            }
            return Ok(());
        }

        let before = current.len();
        *current = compaction::collapse(std::mem::take(current), cut, &summary);
        info!(
            conversation = %id,
            ?mode,
            before,
            after = current.len(),
            "History collapsed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn id() -> ConversationId {
        ConversationId::from("c1")
    }

    async fn seeded(summarizer: Arc<dyn Summarizer>, n: usize) -> MemoryHistoryStore {
        let store = MemoryHistoryStore::new(summarizer);
        let messages = (0..n).map(|i| Message::user(&format!("m{}", i))).collect();
        store.append_messages(&id(), messages).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_append_and_fetch_preserves_order() {
        let store = MemoryHistoryStore::new(Arc::new(NoopSummarizer));
        store
            .append_messages(&id(), vec![Message::user("a"), Message::user("b")])
            .await
            .unwrap();
        store
            .append_messages(&id(), vec![Message::user("c")])
            .await
            .unwrap();

        let messages = store.fetch_messages(&id()).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_unknown_is_empty() {
        let store = MemoryHistoryStore::new(Arc::new(NoopSummarizer));
        assert!(store.fetch_messages(&id()).await.unwrap().is_empty());
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn test_shorten_collapses_oldest_half() {
        let store = seeded(Arc::new(FixedSummarizer("earlier")), 6).await;
        store
            .summarize_and_collapse(&id(), CompactionMode::Shorten)
            .await
            .unwrap();

        let messages = store.fetch_messages(&id()).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, "earlier");
        assert_eq!(messages[1].content, "m3");
    }

    #[tokio::test]
    async fn test_empty_summary_leaves_history() {
        let store = seeded(Arc::new(NoopSummarizer), 6).await;
        store
            .summarize_and_collapse(&id(), CompactionMode::Shorten)
            .await
            .unwrap();
        assert_eq!(store.fetch_messages(&id()).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_without_media_collapses_everything() {
        let store = MemoryHistoryStore::new(Arc::new(FixedSummarizer("all of it")));
        store
            .append_messages(
                &id(),
                vec![
                    Message::user("pic").with_images(vec!["https://x/1.png".into()]),
                    Message::user("text"),
                    Message::assistant("reply"),
                ],
            )
            .await
            .unwrap();

        store
            .summarize_and_collapse(&id(), CompactionMode::ShortenWithoutMedia)
            .await
            .unwrap();

        let messages = store.fetch_messages(&id()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "all of it");
    }

    #[tokio::test]
    async fn test_without_media_and_no_summary_still_drops_media() {
        let store = MemoryHistoryStore::new(Arc::new(NoopSummarizer));
        store
            .append_messages(
                &id(),
                vec![
                    Message::user("pic").with_images(vec!["https://x/1.png".into()]),
                    Message::user("text"),
                ],
            )
            .await
            .unwrap();

        store
            .summarize_and_collapse(&id(), CompactionMode::ShortenWithoutMedia)
            .await
            .unwrap();

        let messages = store.fetch_messages(&id()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "text");
    }
}
