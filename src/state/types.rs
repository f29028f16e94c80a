//! Persisted per-conversation and per-subject records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::{ConversationId, UserId};

/// Attention phase derived from a [`ConversationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionPhase {
    Unfocused,
    Focused,
    Sleeping,
}

/// Behavioral state of one conversation.
///
/// `sleeping_until` dominates: while it lies in the future the conversation
/// is `Sleeping` whatever `is_focused` says.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    pub is_focused: bool,
    pub listening_streak: u32,
    pub ignoring_streak: u32,
    pub sleeping_until: Option<DateTime<Utc>>,
    pub last_ignored_answer_at: Option<DateTime<Utc>>,
    /// Last time the agent was addressed or answered.
    pub last_engaged_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            is_focused: false,
            listening_streak: 0,
            ignoring_streak: 0,
            sleeping_until: None,
            last_ignored_answer_at: None,
            last_engaged_at: None,
        }
    }

    pub fn is_sleeping(&self, now: DateTime<Utc>) -> bool {
        self.sleeping_until.is_some_and(|until| now < until)
    }

    pub fn phase(&self, now: DateTime<Utc>) -> AttentionPhase {
        if self.is_sleeping(now) {
            AttentionPhase::Sleeping
        } else if self.is_focused {
            AttentionPhase::Focused
        } else {
            AttentionPhase::Unfocused
        }
    }
}

/// Whose budget a [`LimitEntry`] tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LimitSubject {
    /// A user's private chat budget.
    Private(UserId),
    /// A group's shared budget.
    Group(ConversationId),
    /// A user's budget inside groups, shared across every group they are in.
    Member(UserId),
}

impl LimitSubject {
    /// Stable key for locks and logs.
    pub fn key(&self) -> String {
        match self {
            LimitSubject::Private(u) => format!("private:{}", u),
            LimitSubject::Group(g) => format!("group:{}", g),
            LimitSubject::Member(u) => format!("member:{}", u),
        }
    }
}

/// A refillable token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitEntry {
    pub subject: LimitSubject,
    pub last_refill_at: DateTime<Utc>,
    /// May go negative when a run costs more than what was left.
    pub remaining_tokens: i64,
}

impl LimitEntry {
    pub fn new(subject: LimitSubject, ceiling: i64, now: DateTime<Utc>) -> Self {
        Self {
            subject,
            last_refill_at: now,
            remaining_tokens: ceiling,
        }
    }

    /// Whether strictly more than `cooldown` has passed since the last refill.
    pub fn refill_due(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        now - self.last_refill_at > cooldown
    }

    /// Reset to `ceiling` if the cooldown elapsed. Returns whether it refilled.
    pub fn refill_if_due(
        &mut self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
        ceiling: i64,
    ) -> bool {
        if self.refill_due(now, cooldown) {
            self.remaining_tokens = ceiling;
            self.last_refill_at = now;
            true
        } else {
            false
        }
    }
}

/// When a user last wrote in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastContact {
    pub group_id: ConversationId,
    pub user_id: UserId,
    pub last_contacted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_phase_sleep_dominates_focus() {
        let mut state = ConversationState::new("c".into());
        state.is_focused = true;
        state.sleeping_until = Some(t0() + Duration::minutes(5));

        assert_eq!(state.phase(t0()), AttentionPhase::Sleeping);
        assert_eq!(
            state.phase(t0() + Duration::minutes(5)),
            AttentionPhase::Focused
        );
    }

    #[test]
    fn test_phase_default_unfocused() {
        let state = ConversationState::new("c".into());
        assert_eq!(state.phase(t0()), AttentionPhase::Unfocused);
    }

    #[test]
    fn test_refill_requires_strictly_elapsed_cooldown() {
        let cooldown = Duration::hours(1);
        let mut entry = LimitEntry::new(LimitSubject::Private("u".into()), 100, t0());
        entry.remaining_tokens = 10;

        assert!(!entry.refill_if_due(t0() + cooldown, cooldown, 100));
        assert_eq!(entry.remaining_tokens, 10);

        let later = t0() + cooldown + Duration::seconds(1);
        assert!(entry.refill_if_due(later, cooldown, 100));
        assert_eq!(entry.remaining_tokens, 100);
        assert_eq!(entry.last_refill_at, later);
    }

    #[test]
    fn test_subject_keys_are_distinct() {
        let user = UserId::from("42");
        assert_ne!(
            LimitSubject::Private(user.clone()).key(),
            LimitSubject::Member(user).key()
        );
        assert_eq!(LimitSubject::Group("g".into()).key(), "group:g");
    }
}
