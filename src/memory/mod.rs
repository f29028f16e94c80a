//! Long-term memory
//!
//! The engine only consumes memory through [`MemoryService`]. The bundled
//! [`KeywordMemory`] ranks stored facts by word overlap with the query.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Facts below this score are not returned.
const MIN_SCORE: f32 = 0.2;
/// At most this many facts per search.
const MAX_RESULTS: usize = 3;

/// Remember and recall facts about an object (a user, a chat, a topic).
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn remember(&self, object_id: &str, fact: &str) -> Result<()>;

    /// Relevant facts joined by newlines, or `None` when nothing matches.
    async fn search(&self, object_id: &str, query: &str) -> Result<Option<String>>;
}

/// In-process memory with keyword scoring.
#[derive(Default)]
pub struct KeywordMemory {
    facts: RwLock<HashMap<String, Vec<String>>>,
}

impl KeywordMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fact_count(&self, object_id: &str) -> usize {
        self.facts
            .read()
            .await
            .get(object_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Share of query words present in `fact`, in `[0, 1]`.
fn score(fact: &str, query: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let fact = words(fact);
    let hits = query.iter().filter(|w| fact.contains(*w)).count();
    hits as f32 / query.len() as f32
}

#[async_trait]
impl MemoryService for KeywordMemory {
    async fn remember(&self, object_id: &str, fact: &str) -> Result<()> {
        debug!(object = object_id, "Remembering fact");
        let mut facts = self.facts.write().await;
        let list = facts.entry(object_id.to_string()).or_default();
        if !list.iter().any(|f| f == fact) {
            list.push(fact.to_string());
        }
        Ok(())
    }

    async fn search(&self, object_id: &str, query: &str) -> Result<Option<String>> {
        let query = words(query);
        let facts = self.facts.read().await;
        let Some(list) = facts.get(object_id) else {
            return Ok(None);
        };

        let mut ranked: Vec<(f32, &String)> = list
            .iter()
            .map(|f| (score(f, &query), f))
            .filter(|(s, _)| *s > MIN_SCORE)
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let found: Vec<&str> = ranked
            .into_iter()
            .take(MAX_RESULTS)
            .map(|(_, f)| f.as_str())
            .collect();
        Ok((!found.is_empty()).then(|| found.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let memory = KeywordMemory::new();
        memory.remember("u1", "Likes green tea").await.unwrap();
        memory.remember("u1", "Has a cat named Miso").await.unwrap();
        memory.remember("u1", "Works night shifts").await.unwrap();

        let found = memory.search("u1", "which cat").await.unwrap();
        assert_eq!(found.as_deref(), Some("Has a cat named Miso"));
    }

    #[tokio::test]
    async fn test_search_is_scoped_by_object() {
        let memory = KeywordMemory::new();
        memory.remember("u1", "Likes green tea").await.unwrap();
        assert!(memory.search("u2", "tea").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_facts_stored_once() {
        let memory = KeywordMemory::new();
        memory.remember("u1", "Likes tea").await.unwrap();
        memory.remember("u1", "Likes tea").await.unwrap();
        assert_eq!(memory.fact_count("u1").await, 1);
    }

    #[test]
    fn test_score_empty_query() {
        assert_eq!(score("anything", &HashSet::new()), 0.0);
    }
}
