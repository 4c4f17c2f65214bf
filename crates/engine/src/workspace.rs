// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task workspace allocation.

use asa_core::TaskId;
use std::path::{Path, PathBuf};

/// Path for a task's workspace under the configured root. The root is
/// created; the leaf is left to the clone (git refuses a non-empty
/// destination).
pub fn allocate_workspace(root: &Path, task_id: &TaskId) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join(task_id.as_str()))
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
