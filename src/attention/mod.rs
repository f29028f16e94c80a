//! Attention module - focus, sleep and streak policy
//!
//! Every run starts with [`AttentionMachine::evaluate`], which reads the
//! conversation state fresh, applies the transition rules in order and
//! decides whether the completion loop runs at all.

pub mod effects;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{ConversationKind, OutboundSink};
use crate::config::{AttentionConfig, PromptsConfig};
use crate::error::Result;
use crate::limits::AdmissionController;
use crate::queue::PendingBatch;
use crate::state::{AttentionPhase, ConversationState, StateStore};

/// Why a run ended before the completion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The conversation is sleeping off an exhausted budget.
    Sleeping,
    /// Unfocused and nobody addressed the agent.
    NotAddressed,
    /// Admission denied; the conversation fell asleep.
    BudgetDenied,
    /// Focused but quiet for too long.
    Inactive,
    /// The batch had no messages.
    EmptyBatch,
}

/// Outcome of [`AttentionMachine::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttentionDecision {
    Proceed {
        /// System note to inject when the run continues on an empty budget.
        budget_note: Option<String>,
    },
    Stop(StopReason),
}

impl AttentionDecision {
    pub fn proceeds(&self) -> bool {
        matches!(self, AttentionDecision::Proceed { .. })
    }
}

pub struct AttentionMachine {
    states: Arc<dyn StateStore>,
    admission: Arc<AdmissionController>,
    outbound: Arc<dyn OutboundSink>,
    config: AttentionConfig,
    busy_reply: String,
    budget_exhausted_note: String,
}

impl AttentionMachine {
    pub fn new(
        states: Arc<dyn StateStore>,
        admission: Arc<AdmissionController>,
        outbound: Arc<dyn OutboundSink>,
        config: AttentionConfig,
        prompts: &PromptsConfig,
    ) -> Self {
        Self {
            states,
            admission,
            outbound,
            config,
            busy_reply: prompts.busy_reply.clone(),
            budget_exhausted_note: prompts.budget_exhausted_note.clone(),
        }
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    /// Apply the transition rules to `batch` and persist the resulting state.
    pub async fn evaluate(
        &self,
        batch: &PendingBatch,
        now: DateTime<Utc>,
    ) -> Result<AttentionDecision> {
        let Some(requester) = batch.requester() else {
            return Ok(AttentionDecision::Stop(StopReason::EmptyBatch));
        };
        let requester = requester.sender_id.clone();
        let addressed = batch.addresses_agent();
        let mut state = self.states.load_state(&batch.conversation_id).await?;

        let decision = match state.phase(now) {
            AttentionPhase::Sleeping => {
                if addressed {
                    self.acknowledge_busy(&mut state, now).await;
                }
                AttentionDecision::Stop(StopReason::Sleeping)
            }
            AttentionPhase::Unfocused if !addressed => {
                AttentionDecision::Stop(StopReason::NotAddressed)
            }
            AttentionPhase::Unfocused => {
                if self.admit(batch, &requester, now).await? {
                    info!(conversation = %batch.conversation_id, "Conversation focused");
                    state.is_focused = true;
                    effects::reset_streaks(&mut state);
                    effects::mark_engaged(&mut state, now);
                    AttentionDecision::Proceed { budget_note: None }
                } else {
                    self.fall_asleep(&mut state, now);
                    self.acknowledge_busy(&mut state, now).await;
                    AttentionDecision::Stop(StopReason::BudgetDenied)
                }
            }
            AttentionPhase::Focused => {
                if !addressed && self.is_inactive(&state, now) {
                    info!(conversation = %batch.conversation_id, "Conversation went quiet; unfocusing");
                    effects::unfocus(&mut state);
                    AttentionDecision::Stop(StopReason::Inactive)
                } else if self.admit(batch, &requester, now).await? {
                    if addressed {
                        effects::mark_engaged(&mut state, now);
                    }
                    AttentionDecision::Proceed { budget_note: None }
                } else {
                    self.fall_asleep(&mut state, now);
                    AttentionDecision::Proceed {
                        budget_note: Some(self.budget_exhausted_note.clone()),
                    }
                }
            }
        };

        self.states.save_state(&state).await?;
        debug!(conversation = %batch.conversation_id, ?decision, "Attention evaluated");
        Ok(decision)
    }

    async fn admit(
        &self,
        batch: &PendingBatch,
        requester: &crate::bus::UserId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match batch.kind {
            ConversationKind::Private => self.admission.check_private(requester, now).await,
            ConversationKind::Group => {
                self.admission
                    .check_group(&batch.conversation_id, requester, now)
                    .await
            }
        }
    }

    fn is_inactive(&self, state: &ConversationState, now: DateTime<Utc>) -> bool {
        state
            .last_engaged_at
            .is_some_and(|at| now - at > self.config.inactivity_timeout())
    }

    fn fall_asleep(&self, state: &mut ConversationState, now: DateTime<Utc>) {
        let until = now + self.config.sleep_cooldown();
        info!(conversation = %state.conversation_id, until = %until, "Budget denied; sleeping");
        state.sleeping_until = Some(until);
    }

    /// Send the busy reply unless one went out within the throttle interval.
    async fn acknowledge_busy(&self, state: &mut ConversationState, now: DateTime<Utc>) {
        let throttled = state
            .last_ignored_answer_at
            .is_some_and(|at| now - at <= self.config.busy_ack_interval());
        if throttled {
            return;
        }

        state.last_ignored_answer_at = Some(now);
        if let Err(e) = self
            .outbound
            .send_busy(&state.conversation_id, &self.busy_reply)
            .await
        {
            warn!(conversation = %state.conversation_id, error = %e, "Failed to send busy reply");
        }
    }
}
