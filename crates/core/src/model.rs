// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model pinning and pricing.
//!
//! Every LLM call declares a [`Purpose`]; the gateway resolves the pinned
//! model through [`model_config`]. Both tables are process-wide read-only
//! state.

use serde::{Deserialize, Serialize};

/// Enumerated LLM call intents. Consumers pass a purpose; the gateway
/// chooses the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    FixGeneration,
    CodeAnalysis,
    BugDetection,
    TestGeneration,
    CodeReview,
    SemanticSearch,
    BehavioralTestGeneration,
    Guardian,
}

crate::simple_display! {
    Purpose {
        FixGeneration => "fix_generation",
        CodeAnalysis => "code_analysis",
        BugDetection => "bug_detection",
        TestGeneration => "test_generation",
        CodeReview => "code_review",
        SemanticSearch => "semantic_search",
        BehavioralTestGeneration => "behavioral_test_generation",
        Guardian => "guardian",
    }
}

/// Configuration for a pinned model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: &'static str,
    pub model: &'static str,
    pub version: &'static str,
    pub max_tokens_per_call: u32,
    pub max_calls_per_task: u32,
    pub temperature: f64,
}

/// Static map from purpose to pinned model. Total by construction.
pub fn model_config(purpose: Purpose) -> ModelConfig {
    let (model, max_tokens_per_call, max_calls_per_task, temperature) = match purpose {
        Purpose::FixGeneration => ("gpt-4o", 4_096, 5, 0.2),
        Purpose::CodeAnalysis => ("gpt-4o-mini", 2_048, 10, 0.2),
        Purpose::BugDetection => ("gpt-4o-mini", 2_048, 5, 0.2),
        Purpose::TestGeneration => ("gpt-4o", 4_096, 3, 0.2),
        Purpose::CodeReview => ("gpt-4o-mini", 2_048, 3, 0.2),
        Purpose::SemanticSearch => ("gpt-4o-mini", 512, 20, 0.0),
        Purpose::BehavioralTestGeneration => ("gpt-4o", 4_096, 3, 0.2),
        Purpose::Guardian => ("gpt-4o", 1_024, 3, 0.0),
    };
    ModelConfig {
        provider: "openai",
        model,
        version: "2024-08",
        max_tokens_per_call,
        max_calls_per_task,
        temperature,
    }
}

/// Per-model prices in USD per 1M tokens: `(input, output)`.
const MODEL_PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4", 30.0, 60.0),
    ("gpt-4-turbo", 10.0, 30.0),
    ("gpt-4o", 2.50, 10.0),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-3.5-turbo", 0.50, 1.50),
];

/// Prices for a model. Unknown models fall back to the most expensive
/// configured model's prices.
pub fn model_pricing(model: &str) -> (f64, f64) {
    MODEL_PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or((MODEL_PRICING[0].1, MODEL_PRICING[0].2))
}

/// Cost of a call in USD. Pricing is per 1M tokens.
pub fn calculate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let (input, output) = model_pricing(model);
    (prompt_tokens as f64 / 1_000_000.0) * input + (completion_tokens as f64 / 1_000_000.0) * output
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
