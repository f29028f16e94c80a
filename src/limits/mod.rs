//! Limits module - token budget admission and debit
//!
//! Private chats draw on one refillable budget per user. Groups draw on a
//! shared group budget plus the per-member budgets of the people talking in
//! them; a member who has gone quiet can still lend part of their budget.

mod cost;
mod support;

pub use cost::UsageCost;
pub use support::{MemorySupportDirectory, SupportDirectory};

#[cfg(test)]
pub use support::MockSupportDirectory;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{ConversationId, UserId};
use crate::config::LimitsConfig;
use crate::error::Result;
use crate::providers::Usage;
use crate::state::{LimitEntry, LimitStore, LimitSubject};
use crate::utils::sync::KeyedLocks;

/// A member budget together with when they last wrote in the group.
#[derive(Debug, Clone)]
struct RankedMember {
    entry: LimitEntry,
    last_contacted_at: DateTime<Utc>,
}

/// Decides whether a run may start and charges for it afterwards.
pub struct AdmissionController {
    store: Arc<dyn LimitStore>,
    support: Arc<dyn SupportDirectory>,
    config: LimitsConfig,
    locks: KeyedLocks,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn LimitStore>,
        support: Arc<dyn SupportDirectory>,
        config: LimitsConfig,
    ) -> Self {
        Self {
            store,
            support,
            config,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &LimitsConfig {
        &self.config
    }

    pub async fn is_supporter(&self, user: &UserId, now: DateTime<Utc>) -> Result<bool> {
        self.support.is_active_supporter(user, now).await
    }

    // ========================================================================
    // Private
    // ========================================================================

    /// Admit a private run iff the user's budget, refilled if due, is positive.
    pub async fn check_private(&self, user: &UserId, now: DateTime<Utc>) -> Result<bool> {
        let subject = LimitSubject::Private(user.clone());
        let _guard = self.locks.lock(&subject.key()).await;

        let mut entry = self
            .store
            .insert_limit_if_absent(LimitEntry::new(
                subject,
                self.config.private_tokens_limit,
                now,
            ))
            .await?;

        if entry.refill_due(now, self.config.private_cooldown()) {
            let ceiling = if self.support.is_active_supporter(user, now).await? {
                self.config.private_support_tokens_limit
            } else {
                self.config.private_tokens_limit
            };
            entry.refill_if_due(now, self.config.private_cooldown(), ceiling);
            self.store.put_limit(&entry).await?;
            debug!(user = %user, remaining = entry.remaining_tokens, "Private limit refilled");
        }

        Ok(entry.remaining_tokens > 0)
    }

    /// Charge a private run. Returns the units debited.
    pub async fn debit_private(&self, user: &UserId, usage: Option<&Usage>) -> Result<i64> {
        let cost = UsageCost::of(usage, &self.config.cost).units();
        let subject = LimitSubject::Private(user.clone());
        let _guard = self.locks.lock(&subject.key()).await;

        debug!(user = %user, cost, "Debiting private budget");
        self.store.debit_limit(&subject, cost).await?;
        Ok(cost)
    }

    // ========================================================================
    // Group
    // ========================================================================

    /// Stamp every sender of a group batch as contacted at `now`.
    pub async fn record_contacts(
        &self,
        group: &ConversationId,
        senders: &[UserId],
        now: DateTime<Utc>,
    ) -> Result<()> {
        for user in senders {
            self.store.touch_contact(group, user, now).await?;
        }
        Ok(())
    }

    /// Admit a group run on behalf of `requester`.
    pub async fn check_group(
        &self,
        group: &ConversationId,
        requester: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let group_subject = LimitSubject::Group(group.clone());
        let _guard = self.locks.lock(&group_subject.key()).await;

        self.store.touch_contact(group, requester, now).await?;
        self.store
            .insert_limit_if_absent(LimitEntry::new(
                LimitSubject::Member(requester.clone()),
                self.config.group_per_user_tokens_limit,
                now,
            ))
            .await?;

        self.refill_members(group, now).await?;

        let mut group_entry = self
            .store
            .insert_limit_if_absent(LimitEntry::new(
                group_subject,
                self.config.group_generic_tokens_limit,
                now,
            ))
            .await?;
        if group_entry.refill_if_due(
            now,
            self.config.group_cooldown(),
            self.config.group_generic_tokens_limit,
        ) {
            self.store.put_limit(&group_entry).await?;
            debug!(group = %group, "Group limit refilled");
        }

        if group_entry.remaining_tokens <= 0 {
            info!(group = %group, "Group budget spent");
            return Ok(false);
        }

        let Some(recent) = self
            .top_member(group, now - self.config.recent_window())
            .await?
        else {
            warn!(group = %group, "No recent member found");
            return Ok(false);
        };

        if recent.entry.remaining_tokens > 0 {
            return Ok(true);
        }

        let Some(top) = self
            .top_member(group, now - self.config.total_window())
            .await?
        else {
            warn!(group = %group, "No known member found");
            return Ok(false);
        };

        let admitted = top.entry.remaining_tokens > self.fallback_floor();
        if !admitted {
            info!(group = %group, "Every member budget spent");
        }
        Ok(admitted)
    }

    /// Charge a group run to the group and to exactly one member.
    ///
    /// The member is the top recent one if they still have tokens, else the
    /// top member over the whole window. With nobody eligible nothing is
    /// charged and 0 is returned. Otherwise returns the units debited.
    pub async fn debit_group(
        &self,
        group: &ConversationId,
        usage: Option<&Usage>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let cost = UsageCost::of(usage, &self.config.cost).units();
        let group_subject = LimitSubject::Group(group.clone());
        let _guard = self.locks.lock(&group_subject.key()).await;

        let recent = self
            .top_member(group, now - self.config.recent_window())
            .await?
            .filter(|m| m.entry.remaining_tokens > 0);
        let chosen = match recent {
            Some(member) => Some(member),
            None => {
                self.top_member(group, now - self.config.total_window())
                    .await?
            }
        };

        let Some(member) = chosen else {
            warn!(group = %group, cost, "No member to charge, skipping debit");
            return Ok(0);
        };
        debug!(group = %group, member = %member.entry.subject.key(), cost, "Debiting member");
        self.store.debit_limit(&member.entry.subject, cost).await?;
        self.store.debit_limit(&group_subject, cost).await?;
        Ok(cost)
    }

    /// Tokens a quiet member keeps for themselves, rounded to whole units.
    fn fallback_floor(&self) -> i64 {
        let share = 1.0 - self.config.group_per_user_max_other_usage_coeff;
        (share * self.config.group_per_user_tokens_limit as f64).round() as i64
    }

    /// Refill members contacted within the total window whose cooldown elapsed.
    async fn refill_members(&self, group: &ConversationId, now: DateTime<Utc>) -> Result<()> {
        let contacts = self
            .store
            .contacts_since(group, now - self.config.total_window())
            .await?;

        for contact in contacts {
            let subject = LimitSubject::Member(contact.user_id.clone());
            let _guard = self.locks.lock(&subject.key()).await;

            let Some(mut entry) = self.store.get_limit(&subject).await? else {
                continue;
            };
            if !entry.refill_due(now, self.config.group_cooldown()) {
                continue;
            }
            let ceiling = if self
                .support
                .is_active_supporter(&contact.user_id, now)
                .await?
            {
                self.config.group_per_support_user_tokens_limit
            } else {
                self.config.group_per_user_tokens_limit
            };
            entry.refill_if_due(now, self.config.group_cooldown(), ceiling);
            self.store.put_limit(&entry).await?;
        }
        Ok(())
    }

    /// Member contacted since `since` with the most tokens left; ties go to
    /// the most recently contacted.
    async fn top_member(
        &self,
        group: &ConversationId,
        since: DateTime<Utc>,
    ) -> Result<Option<RankedMember>> {
        let contacts = self.store.contacts_since(group, since).await?;
        let mut best: Option<RankedMember> = None;

        for contact in contacts {
            let subject = LimitSubject::Member(contact.user_id);
            let Some(entry) = self.store.get_limit(&subject).await? else {
                continue;
            };
            let candidate = RankedMember {
                entry,
                last_contacted_at: contact.last_contacted_at,
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    (candidate.entry.remaining_tokens, candidate.last_contacted_at)
                        > (current.entry.remaining_tokens, current.last_contacted_at)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        Ok(best)
    }
}
