//! State transitions triggered from inside a run.
//!
//! Pure functions over [`ConversationState`]; callers load and save.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::state::ConversationState;

/// Stop following the conversation.
pub fn unfocus(state: &mut ConversationState) {
    state.is_focused = false;
}

/// Count one ignored turn.
///
/// The event that finds the streak already at `limit` unfocuses and resets
/// it instead of counting. Returns `true` when that happened.
pub fn record_ignored(state: &mut ConversationState, limit: u32) -> bool {
    if state.ignoring_streak >= limit {
        info!(conversation = %state.conversation_id, "Ignoring streak saturated; unfocusing");
        state.ignoring_streak = 0;
        unfocus(state);
        true
    } else {
        state.ignoring_streak += 1;
        false
    }
}

/// Count one "still listening" turn. Returns the new streak.
pub fn record_listening(state: &mut ConversationState) -> u32 {
    state.ignoring_streak = 0;
    state.listening_streak += 1;
    state.listening_streak
}

pub fn reset_ignoring(state: &mut ConversationState) {
    state.ignoring_streak = 0;
}

pub fn reset_streaks(state: &mut ConversationState) {
    state.ignoring_streak = 0;
    state.listening_streak = 0;
}

/// The agent was addressed or answered at `now`.
pub fn mark_engaged(state: &mut ConversationState, now: DateTime<Utc>) {
    state.last_engaged_at = Some(now);
}
