//! Cache-aware cost of one completion call.

use crate::config::CostWeights;
use crate::providers::Usage;

/// Budget units charged for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct UsageCost(pub i64);

impl UsageCost {
    /// Weigh `usage` into budget units.
    ///
    /// With cache details, cached prompt tokens are cheaper than fresh ones.
    /// Without them the whole prompt is charged at the flat rate.
    pub fn compute(usage: &Usage, weights: &CostWeights) -> Self {
        let prompt = u64::from(usage.prompt_tokens);
        let completion = u64::from(usage.completion_tokens) * weights.completion_multiplier;

        let units = match usage.cached_tokens {
            Some(cached) => {
                let cached = u64::from(cached).min(prompt);
                cached / weights.cached_divisor.max(1)
                    + (prompt - cached) / weights.fresh_divisor.max(1)
                    + completion
            }
            None => completion + prompt / weights.uncached_prompt_divisor.max(1),
        };

        Self(units as i64)
    }

    /// Cost of an optional usage report; nothing reported costs nothing.
    pub fn of(usage: Option<&Usage>, weights: &CostWeights) -> Self {
        usage
            .map(|u| Self::compute(u, weights))
            .unwrap_or_default()
    }

    pub fn units(self) -> i64 {
        self.0
    }
}
