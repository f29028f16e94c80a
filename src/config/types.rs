//! Configuration type definitions for Murmur
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial config file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration struct for Murmur
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Debounced ingestion queue
    pub queue: QueueConfig,
    /// Poll loop and run tracking
    pub dispatcher: DispatcherConfig,
    /// Focus, sleep and streak policy
    pub attention: AttentionConfig,
    /// Token budgets and cost weights
    pub limits: LimitsConfig,
    /// Completion loop ceilings and model selection
    pub completion: CompletionConfig,
    /// Instruction and canned reply texts
    pub prompts: PromptsConfig,
    /// Completion service endpoint
    pub provider: ProviderConfig,
    /// Log output
    pub logging: LoggingConfig,
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// Readiness policy for pending batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// A batch becomes ready once it holds more than this many messages.
    pub count_limit: usize,
    /// Lower bound of the randomized idle threshold, in milliseconds.
    pub time_limit_lower_bound_ms: u64,
    /// Upper bound of the randomized idle threshold, in milliseconds.
    pub time_limit_upper_bound_ms: u64,
    /// Empty entries idle for longer than this are evicted by the sweep.
    pub idle_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            count_limit: 4,
            time_limit_lower_bound_ms: 0,
            time_limit_upper_bound_ms: 4_000,
            idle_ttl_secs: 3_600,
        }
    }
}

impl QueueConfig {
    pub fn time_limit_lower_bound(&self) -> Duration {
        Duration::from_millis(self.time_limit_lower_bound_ms)
    }

    pub fn time_limit_upper_bound(&self) -> Duration {
        Duration::from_millis(self.time_limit_upper_bound_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

// ============================================================================
// Dispatcher Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Poll cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// How often idle queue entries are swept, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            sweep_interval_secs: 300,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// ============================================================================
// Attention Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Ignoring events tolerated before the conversation is unfocused.
    pub ignoring_streak_limit: u32,
    /// Listening events before the agent is told it has waited too long.
    pub listening_streak_limit: u32,
    /// How long a conversation sleeps after its budget is denied.
    pub sleep_cooldown_secs: i64,
    /// Minimum gap between two "still busy" acknowledgments.
    pub busy_ack_interval_secs: i64,
    /// A focused conversation with no engagement for this long unfocuses.
    pub inactivity_timeout_secs: i64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            ignoring_streak_limit: 10,
            listening_streak_limit: 5,
            sleep_cooldown_secs: 3_600,
            busy_ack_interval_secs: 600,
            inactivity_timeout_secs: 1_800,
        }
    }
}

impl AttentionConfig {
    pub fn sleep_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sleep_cooldown_secs)
    }

    pub fn busy_ack_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.busy_ack_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_timeout_secs)
    }
}

// ============================================================================
// Limits Configuration
// ============================================================================

/// Token budgets. Ceilings are in cost units as computed by [`CostWeights`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub private_cooldown_secs: i64,
    pub private_tokens_limit: i64,
    pub private_support_tokens_limit: i64,
    pub group_cooldown_secs: i64,
    /// Hard ceiling for a whole group.
    pub group_generic_tokens_limit: i64,
    pub group_per_user_tokens_limit: i64,
    pub group_per_support_user_tokens_limit: i64,
    /// Share of an inactive member's budget that others may spend.
    pub group_per_user_max_other_usage_coeff: f64,
    /// Members seen within this window count as "recent".
    pub recent_window_secs: i64,
    /// Members seen within this window count as known at all.
    pub total_window_secs: i64,
    pub cost: CostWeights,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            private_cooldown_secs: 3 * 3_600,
            private_tokens_limit: 30_000,
            private_support_tokens_limit: 120_000,
            group_cooldown_secs: 3 * 3_600,
            group_generic_tokens_limit: 100_000,
            group_per_user_tokens_limit: 20_000,
            group_per_support_user_tokens_limit: 60_000,
            group_per_user_max_other_usage_coeff: 0.8,
            recent_window_secs: 180,
            total_window_secs: 259_200,
            cost: CostWeights::default(),
        }
    }
}

impl LimitsConfig {
    pub fn private_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.private_cooldown_secs)
    }

    pub fn group_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.group_cooldown_secs)
    }

    pub fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recent_window_secs)
    }

    pub fn total_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.total_window_secs)
    }
}

/// Weights of the cache-aware usage cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub cached_divisor: u64,
    pub fresh_divisor: u64,
    pub completion_multiplier: u64,
    /// Used when the provider reports no cache details.
    pub uncached_prompt_divisor: u64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cached_divisor: 4,
            fresh_divisor: 2,
            completion_multiplier: 2,
            uncached_prompt_divisor: 3,
        }
    }
}

// ============================================================================
// Completion Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub max_attempts: u32,
    pub max_iterations: u32,
    pub max_tool_calls: u32,
    /// Backoff before retrying a generic transient failure, in milliseconds.
    pub retry_backoff_ms: u64,
    pub group_model: String,
    pub private_model: String,
    pub private_supporter_model: String,
    /// History is shortened proactively past this many tokens.
    pub group_max_context_tokens: u32,
    pub private_max_context_tokens: u32,
    pub private_supporter_max_context_tokens: u32,
    /// Tools offered to the model. Every name must have an implementation.
    pub tool_catalog: Vec<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_iterations: 10,
            max_tool_calls: 5,
            retry_backoff_ms: 2_000,
            group_model: "gpt-4o-mini".to_string(),
            private_model: "gpt-4o-mini".to_string(),
            private_supporter_model: "gpt-4o".to_string(),
            group_max_context_tokens: 16_000,
            private_max_context_tokens: 16_000,
            private_supporter_max_context_tokens: 32_000,
            tool_catalog: [
                "ignore_message",
                "wait_for_user_end",
                "unfocus_chat",
                "think",
                "remember_fact",
                "fetch_info",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl CompletionConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ============================================================================
// Prompts Configuration
// ============================================================================

/// Instruction and canned texts. Wording is deployment policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub private_instruction: String,
    pub group_instruction: String,
    pub summary_instruction: String,
    /// Injected when the run continues on an exhausted budget.
    pub budget_exhausted_note: String,
    pub too_many_tools_note: String,
    /// Sent to the chat while the conversation sleeps.
    pub busy_reply: String,
    pub ignored_result: String,
    pub waiting_result: String,
    pub waited_too_long_result: String,
    pub unfocused_result: String,
    pub tool_failed_result: String,
    pub tool_skipped_result: String,
    pub fact_saved_result: String,
    pub info_not_found_result: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            private_instruction: "You are a friendly chat companion. Answer with a JSON object \
                {\"text\": [messages], \"sticker\": null}."
                .to_string(),
            group_instruction: "You are a member of a group chat. Only speak when you have \
                something to add. Answer with a JSON object {\"text\": [messages], \"sticker\": null}."
                .to_string(),
            summary_instruction: "Summarize the conversation below in a few sentences, keeping \
                names, facts and open questions."
                .to_string(),
            budget_exhausted_note: "You are running out of energy. Say goodbye briefly; you will \
                be back later."
                .to_string(),
            too_many_tools_note: "You called too many tools in a row. Stop calling tools now."
                .to_string(),
            busy_reply: "I'm resting right now, talk to you a bit later!".to_string(),
            ignored_result: "Message ignored.".to_string(),
            waiting_result: "The user has not finished their thought yet.".to_string(),
            waited_too_long_result: "You have been waiting for a long time; consider answering."
                .to_string(),
            unfocused_result: "You stopped following this chat.".to_string(),
            tool_failed_result: "Sorry, the tool failed. Continue without it.".to_string(),
            tool_skipped_result: "Skipped: tool call limit reached.".to_string(),
            fact_saved_result: "Saved.".to_string(),
            info_not_found_result: "Nothing found.".to_string(),
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Append JSON logs to this file instead of stderr.
    pub file: Option<String>,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            level: "info".to_string(),
        }
    }
}
