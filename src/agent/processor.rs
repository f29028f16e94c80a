//! One conversation run: attention, admission, completion, debit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::attention::{AttentionDecision, AttentionMachine, StopReason};
use crate::bus::{ConversationKind, UserId};
use crate::config::{CompletionConfig, PromptsConfig};
use crate::dispatcher::ConversationRunner;
use crate::error::Result;
use crate::limits::AdmissionController;
use crate::queue::PendingBatch;

use super::r#loop::{CompletionLoop, RunContext, RunOutcome};

/// How a processed batch ended.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Attention stopped the run before any completion call.
    Stopped(StopReason),
    /// The completion loop ran; `debited` units were charged.
    Completed { outcome: RunOutcome, debited: i64 },
}

/// Drives a batch through the attention machine and the completion loop.
pub struct ChatProcessor {
    attention: AttentionMachine,
    admission: Arc<AdmissionController>,
    completion: CompletionLoop,
    prompts: PromptsConfig,
}

impl ChatProcessor {
    pub fn new(
        attention: AttentionMachine,
        admission: Arc<AdmissionController>,
        completion: CompletionLoop,
        prompts: PromptsConfig,
    ) -> Self {
        Self {
            attention,
            admission,
            completion,
            prompts,
        }
    }

    /// Process `batch` as of `now`. The batch is already in history.
    pub async fn process_at(&self, batch: &PendingBatch, now: DateTime<Utc>) -> Result<ProcessOutcome> {
        let id = &batch.conversation_id;

        if batch.kind == ConversationKind::Group {
            let senders: Vec<UserId> = batch
                .messages
                .iter()
                .map(|m| m.sender_id.clone())
                .collect();
            self.admission.record_contacts(id, &senders, now).await?;
        }

        let budget_note = match self.attention.evaluate(batch, now).await? {
            AttentionDecision::Stop(reason) => {
                debug!(conversation = %id, ?reason, "Run stopped by attention");
                return Ok(ProcessOutcome::Stopped(reason));
            }
            AttentionDecision::Proceed { budget_note } => budget_note,
        };

        // evaluate() only proceeds on non-empty batches
        let Some(requester) = batch.requester().map(|m| m.sender_id.clone()) else {
            return Ok(ProcessOutcome::Stopped(StopReason::EmptyBatch));
        };

        let config = self.completion.config();
        let (model, max_context_tokens, instruction) = match batch.kind {
            ConversationKind::Group => (
                config.group_model.clone(),
                config.group_max_context_tokens,
                self.prompts.group_instruction.clone(),
            ),
            ConversationKind::Private => {
                let supporter = self.admission.is_supporter(&requester, now).await?;
                let (model, max) = private_model(config, supporter);
                (model, max, self.prompts.private_instruction.clone())
            }
        };

        let ctx = RunContext {
            conversation_id: id.clone(),
            kind: batch.kind,
            model,
            max_context_tokens,
            instruction,
            budget_note,
            now,
        };
        let outcome = self.completion.run(&ctx).await?;

        let usage = outcome.last_usage.as_ref();
        let debited = match batch.kind {
            ConversationKind::Private => self.admission.debit_private(&requester, usage).await?,
            ConversationKind::Group => self.admission.debit_group(id, usage, now).await?,
        };
        info!(conversation = %id, debited, stop = ?outcome.stop, "Run finished");

        Ok(ProcessOutcome::Completed { outcome, debited })
    }
}

fn private_model(config: &CompletionConfig, supporter: bool) -> (String, u32) {
    if supporter {
        (
            config.private_supporter_model.clone(),
            config.private_supporter_max_context_tokens,
        )
    } else {
        (config.private_model.clone(), config.private_max_context_tokens)
    }
}

#[async_trait]
impl ConversationRunner for ChatProcessor {
    async fn run(&self, batch: PendingBatch) -> Result<()> {
        self.process_at(&batch, Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supporter_gets_supporter_model() {
        let config = CompletionConfig::default();
        assert_eq!(private_model(&config, true).0, config.private_supporter_model);
        assert_eq!(
            private_model(&config, false),
            (config.private_model.clone(), config.private_max_context_tokens)
        );
    }
}
