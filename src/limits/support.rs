//! Supporter lookup.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::bus::UserId;
use crate::error::Result;

/// Answers whether a user currently holds a paid support tier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SupportDirectory: Send + Sync {
    async fn is_active_supporter(&self, user: &UserId, now: DateTime<Utc>) -> Result<bool>;
}

/// Support subscriptions held in memory as end timestamps.
#[derive(Default)]
pub struct MemorySupportDirectory {
    ends: RwLock<HashMap<UserId, DateTime<Utc>>>,
}

impl MemorySupportDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend support to `now + interval`. An expired subscription restarts
    /// from `now`.
    pub async fn prolong(&self, user: &UserId, interval: Duration, now: DateTime<Utc>) {
        let end = now + interval;
        info!(user = %user, until = %end, "Support prolonged");
        self.ends.write().await.insert(user.clone(), end);
    }

    pub async fn support_end(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.ends.read().await.get(user).copied()
    }
}

#[async_trait]
impl SupportDirectory for MemorySupportDirectory {
    async fn is_active_supporter(&self, user: &UserId, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .ends
            .read()
            .await
            .get(user)
            .is_some_and(|end| *end > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_support_expires_at_end_timestamp() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let dir = MemorySupportDirectory::new();
        let user = UserId::from("u");

        assert!(!dir.is_active_supporter(&user, t0).await.unwrap());

        dir.prolong(&user, Duration::days(30), t0).await;
        assert!(dir.is_active_supporter(&user, t0).await.unwrap());
        assert!(!dir
            .is_active_supporter(&user, t0 + Duration::days(30))
            .await
            .unwrap());
    }
}
