// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Budget limits enforced before every provider call.

use std::time::Duration;

/// Global budget caps. Defaults are deliberately conservative; production
/// values come from the environment (see the daemon's config).
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLimits {
    /// Cumulative token cap per task.
    pub max_tokens_per_task: u64,
    /// Cumulative cost cap per task, USD.
    pub max_cost_per_task_usd: f64,
    /// Daily (UTC) cost cap per principal, USD.
    pub max_cost_per_principal_per_day_usd: f64,
    /// Wall-clock bound on each provider call attempt.
    pub llm_call_timeout: Duration,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_tokens_per_task: 100_000,
            max_cost_per_task_usd: 5.0,
            max_cost_per_principal_per_day_usd: 20.0,
            llm_call_timeout: Duration::from_secs(120),
        }
    }
}
