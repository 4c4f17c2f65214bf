// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned prompt records.
//!
//! Prompts are immutable JSON documents loaded lazily and cached
//! in-process. Each carries a semantic version, an output-schema version,
//! and a checksum over its text so usage logs can attribute outcomes to
//! exact wordings.

use asa_adapters::ChatMessage;
use asa_core::Purpose;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from prompt loading.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt not found for {purpose} {version}")]
    NotFound { purpose: String, version: String },
    #[error("invalid prompt {name}: {message}")]
    Invalid { name: String, message: String },
    #[error("IO error reading prompt: {0}")]
    Io(#[from] std::io::Error),
}

/// Optional per-prompt model overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptModelConfig {
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Required-field output schema description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSchema {
    #[serde(default)]
    pub required: Vec<String>,
}

/// An immutable versioned prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptVersion {
    pub version: String,
    pub schema_version: String,
    pub checksum: String,
    pub purpose: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    pub user_prompt_template: String,
    #[serde(default)]
    pub output_schema: OutputSchema,
    #[serde(default)]
    pub model_config: PromptModelConfig,
}

impl PromptVersion {
    fn parse(name: &str, json: &str) -> Result<Self, PromptError> {
        let prompt: PromptVersion =
            serde_json::from_str(json).map_err(|e| PromptError::Invalid {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        for (field, value) in [
            ("version", &prompt.version),
            ("schema_version", &prompt.schema_version),
            ("checksum", &prompt.checksum),
            ("purpose", &prompt.purpose),
            ("system_prompt", &prompt.system_prompt),
            ("user_prompt_template", &prompt.user_prompt_template),
        ] {
            if value.is_empty() {
                return Err(PromptError::Invalid {
                    name: name.to_string(),
                    message: format!("missing required field: {field}"),
                });
            }
        }

        if !prompt.verify_checksum() {
            tracing::warn!(
                prompt = name,
                declared = %prompt.checksum,
                computed = %prompt.computed_checksum(),
                "prompt checksum mismatch"
            );
        }

        Ok(prompt)
    }

    /// First 16 hex chars of sha256 over the prompt text.
    pub fn computed_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.system_prompt.as_bytes());
        hasher.update(self.user_prompt_template.as_bytes());
        let digest = hasher.finalize();
        let hex = format!("{digest:x}");
        hex[..16].to_string()
    }

    /// Whether the declared checksum matches the prompt text.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.computed_checksum()
    }

    /// Render the user prompt template.
    ///
    /// `$name` and `${name}` refer to variables; unknown variables render
    /// empty; `$$` escapes a literal dollar sign.
    pub fn render_user_prompt(&self, vars: &HashMap<String, String>) -> String {
        let template = &self.user_prompt_template;
        let mut out = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some((_, '$')) => {
                    out.push('$');
                    chars.next();
                }
                Some((_, '{')) => {
                    chars.next();
                    let mut name = String::new();
                    for (_, nc) in chars.by_ref() {
                        if nc == '}' {
                            break;
                        }
                        name.push(nc);
                    }
                    out.push_str(vars.get(&name).map(String::as_str).unwrap_or(""));
                }
                Some((_, nc)) if nc.is_alphabetic() || *nc == '_' => {
                    let start = i + 1;
                    let mut end = start;
                    while let Some((j, nc)) = chars.peek() {
                        if nc.is_alphanumeric() || *nc == '_' {
                            end = j + nc.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &template[start..end];
                    out.push_str(vars.get(name).map(String::as_str).unwrap_or(""));
                }
                _ => out.push('$'),
            }
        }

        out
    }

    /// Provider-format messages for this prompt.
    pub fn messages(&self, vars: &HashMap<String, String>) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.render_user_prompt(vars)),
        ]
    }

    /// Validate an LLM response against the output schema (required
    /// fields must be present).
    pub fn validate_response(&self, response: &serde_json::Value) -> Result<(), String> {
        for field in &self.output_schema.required {
            if response.get(field).is_none() {
                return Err(format!(
                    "response missing required field: {field} (schema {})",
                    self.schema_version
                ));
            }
        }
        Ok(())
    }
}

/// Prompts compiled into the binary, used when no prompts directory is
/// configured.
const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    ("code_agent_v1", include_str!("prompts/code_agent_v1.json")),
    (
        "behavioral_test_v1",
        include_str!("prompts/behavioral_test_v1.json"),
    ),
    ("guardian_v1", include_str!("prompts/guardian_v1.json")),
];

/// File base name for a purpose (several purposes share prompt files).
fn file_base(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::FixGeneration => "code_agent",
        Purpose::BehavioralTestGeneration | Purpose::TestGeneration => "behavioral_test",
        Purpose::Guardian => "guardian",
        Purpose::CodeAnalysis => "code_analysis",
        Purpose::BugDetection => "bug_detection",
        Purpose::CodeReview => "code_review",
        Purpose::SemanticSearch => "semantic_search",
    }
}

/// Lazy-loading prompt cache.
pub struct PromptStore {
    /// Directory of `{base}_{version}.json` files; None means builtin only.
    dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, Arc<PromptVersion>>>,
}

impl PromptStore {
    /// Store serving only the compiled-in prompts.
    pub fn builtin() -> Self {
        Self {
            dir: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Store loading from a directory, falling back to builtins.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load a versioned prompt, from cache when possible.
    pub fn load(&self, purpose: Purpose, version: &str) -> Result<Arc<PromptVersion>, PromptError> {
        let name = format!("{}_{}", file_base(purpose), version);

        if let Some(prompt) = self.cache.lock().get(&name) {
            return Ok(Arc::clone(prompt));
        }

        let json = self.read_source(&name)?.ok_or_else(|| PromptError::NotFound {
            purpose: purpose.to_string(),
            version: version.to_string(),
        })?;

        let prompt = Arc::new(PromptVersion::parse(&name, &json)?);
        self.cache
            .lock()
            .insert(name, Arc::clone(&prompt));
        Ok(prompt)
    }

    fn read_source(&self, name: &str) -> Result<Option<String>, PromptError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.json"));
            match std::fs::read_to_string(&path) {
                Ok(json) => return Ok(Some(json)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(BUILTIN_PROMPTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, json)| json.to_string()))
    }
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
