// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-level patch types produced by fix generation.
//!
//! A [`PatchSet`] is the transport form the gateway validates out of the
//! LLM's JSON response; the applicator consumes it against a workspace.

use serde::{Deserialize, Serialize};

/// Patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchType {
    /// Replace lines `start_line..=end_line` with `new_code`
    Replace,
    /// Insert `new_code` before `start_line`
    Insert,
    /// Delete lines `start_line..=end_line`
    Delete,
}

crate::simple_display! {
    PatchType {
        Replace => "replace",
        Insert => "insert",
        Delete => "delete",
    }
}

/// A single line-level patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Relative path to the file to patch
    pub file_path: String,
    pub patch_type: PatchType,
    /// Starting line number (1-indexed)
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: u32,
    /// New code to apply (for replace/insert)
    #[serde(default)]
    pub new_code: String,
    #[serde(default)]
    pub description: String,
}

impl Patch {
    /// Validate structural constraints that hold independent of any file.
    pub fn validate_syntax(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.file_path.trim().is_empty() {
            errors.push("file_path must not be empty".to_string());
        }
        if self.start_line < 1 {
            errors.push(format!("start_line must be >= 1, got {}", self.start_line));
        }
        if self.end_line < self.start_line {
            errors.push(format!(
                "end_line ({}) must be >= start_line ({})",
                self.end_line, self.start_line
            ));
        }
        if matches!(self.patch_type, PatchType::Replace | PatchType::Insert)
            && self.new_code.is_empty()
        {
            errors.push(format!(
                "new_code required for {} operations",
                self.patch_type
            ));
        }

        errors
    }
}

/// An ordered collection of patches with set-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchSet {
    pub patches: Vec<Patch>,
    /// Original bug description this set addresses
    #[serde(default)]
    pub bug_description: String,
    /// Confidence score in [0, 1]
    #[serde(default)]
    pub confidence: f64,
    /// Explanation of why these patches fix the bug
    #[serde(default)]
    pub rationale: String,
}

impl PatchSet {
    /// Structural validation of every patch; returns all errors found.
    pub fn validate_syntax(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.patches.is_empty() {
            errors.push("patch set contains no patches".to_string());
        }
        for (i, patch) in self.patches.iter().enumerate() {
            for err in patch.validate_syntax() {
                errors.push(format!("patch {}: {}", i + 1, err));
            }
        }
        errors
    }
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
