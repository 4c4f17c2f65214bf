// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Patch applicator: line-accurate mutation of workspace files with
//! backups and rollback.
//!
//! Patches apply in the order provided. Each touched file is backed up
//! under `<workspace>/.asa_backups/<relative>/<name>.<timestamp>.bak`
//! before mutation, and writes go through a temp file + rename.

use asa_core::{Clock, Patch, PatchSet, PatchType};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Backups directory name under the workspace root.
const BACKUP_DIR: &str = ".asa_backups";

/// Suffix for the atomic-write staging file.
const TMP_SUFFIX: &str = ".asa_tmp";

/// Errors from patch application.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("IO error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl PatchError {
    fn io(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Result of applying a patch set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub success: bool,
    pub applied: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Applies patch sets to one workspace.
pub struct PatchApplicator<C: Clock> {
    workspace: PathBuf,
    backup_dir: PathBuf,
    create_backups: bool,
    /// Applied patches with their backup files, in apply order.
    applied: Vec<(Patch, PathBuf)>,
    clock: C,
}

impl<C: Clock> PatchApplicator<C> {
    pub fn new(workspace: impl Into<PathBuf>, clock: C) -> Self {
        let workspace = workspace.into();
        let backup_dir = workspace.join(BACKUP_DIR);
        Self {
            workspace,
            backup_dir,
            create_backups: true,
            applied: Vec::new(),
            clock,
        }
    }

    /// Disable backups (and with them, rollback support).
    pub fn without_backups(mut self) -> Self {
        self.create_backups = false;
        self
    }

    /// Number of patches applied and not rolled back.
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Validate a patch against the workspace without applying it.
    pub fn validate_patch(&self, patch: &Patch) -> Vec<String> {
        let mut errors = patch.validate_syntax();

        let Some(target) = self.resolve(&patch.file_path) else {
            errors.push(format!("path escapes the workspace: {}", patch.file_path));
            return errors;
        };

        if !target.is_file() {
            errors.push(format!("file does not exist: {}", patch.file_path));
            return errors;
        }

        if errors.is_empty() {
            match std::fs::read_to_string(&target) {
                Ok(contents) => {
                    let line_count = count_lines(&contents) as u32;
                    if patch.end_line > line_count {
                        errors.push(format!(
                            "line range {}-{} exceeds file length {} ({})",
                            patch.start_line, patch.end_line, line_count, patch.file_path
                        ));
                    }
                }
                Err(e) => errors.push(format!("cannot read {}: {e}", patch.file_path)),
            }
        }

        errors
    }

    /// Apply a patch set in order.
    ///
    /// With `fail_fast` the first error stops the run (already-applied
    /// patches stay applied and remain rollback-able); otherwise errors
    /// accumulate and the remaining patches still apply.
    pub fn apply_set(&mut self, set: &PatchSet, fail_fast: bool) -> ApplyReport {
        let mut report = ApplyReport {
            success: true,
            ..Default::default()
        };

        let validation: Vec<String> = set
            .patches
            .iter()
            .enumerate()
            .flat_map(|(i, patch)| {
                self.validate_patch(patch)
                    .into_iter()
                    .map(move |e| format!("patch {}: {}", i + 1, e))
            })
            .collect();
        if !validation.is_empty() {
            report.success = false;
            report.errors = validation;
            if fail_fast {
                return report;
            }
        }

        for (i, patch) in set.patches.iter().enumerate() {
            match self.apply_patch(patch) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    report.failed += 1;
                    report.success = false;
                    report
                        .errors
                        .push(format!("patch {} ({}): {e}", i + 1, patch.file_path));
                    if fail_fast {
                        break;
                    }
                }
            }
        }

        report
    }

    /// Apply a single patch. On a write failure the target is restored
    /// from its backup before the error is returned.
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<(), PatchError> {
        let errors = self.validate_patch(patch);
        if !errors.is_empty() {
            return Err(PatchError::Validation(errors));
        }

        // Resolution cannot fail after validation
        let Some(target) = self.resolve(&patch.file_path) else {
            return Err(PatchError::Validation(vec![format!(
                "path escapes the workspace: {}",
                patch.file_path
            )]));
        };

        let backup = if self.create_backups {
            Some(self.back_up(&target, &patch.file_path)?)
        } else {
            None
        };

        let result = self.splice(&target, patch);

        match result {
            Ok(()) => {
                tracing::info!(
                    file = %patch.file_path,
                    op = %patch.patch_type,
                    lines = format!("{}-{}", patch.start_line, patch.end_line),
                    "applied patch"
                );
                if let Some(backup) = backup {
                    self.applied.push((patch.clone(), backup));
                }
                Ok(())
            }
            Err(e) => {
                if let Some(backup) = &backup {
                    if backup.exists() {
                        let _ = std::fs::copy(backup, &target);
                        tracing::warn!(file = %patch.file_path, "restored from backup after failed apply");
                    }
                }
                Err(e)
            }
        }
    }

    fn splice(&self, target: &Path, patch: &Patch) -> Result<(), PatchError> {
        let contents =
            std::fs::read_to_string(target).map_err(|e| PatchError::io(target, e))?;
        let mut lines: Vec<String> = contents
            .split_inclusive('\n')
            .map(str::to_string)
            .collect();

        let start = patch.start_line as usize - 1;
        let end = patch.end_line as usize;

        let mut new_code = patch.new_code.clone();
        if !new_code.is_empty() && !new_code.ends_with('\n') {
            new_code.push('\n');
        }

        match patch.patch_type {
            PatchType::Replace => {
                lines.splice(start..end, [new_code]);
            }
            PatchType::Insert => {
                lines.splice(start..start, [new_code]);
            }
            PatchType::Delete => {
                lines.splice(start..end, std::iter::empty::<String>());
            }
        }

        let output: String = lines.concat();
        let tmp = tmp_path(target);
        std::fs::write(&tmp, &output).map_err(|e| PatchError::io(&tmp, e))?;
        std::fs::rename(&tmp, target).map_err(|e| PatchError::io(target, e))?;
        Ok(())
    }

    fn back_up(&self, target: &Path, relative: &str) -> Result<PathBuf, PatchError> {
        let rel = Path::new(relative);
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));
        let subdir = self.backup_dir.join(parent);
        std::fs::create_dir_all(&subdir).map_err(|e| PatchError::io(&subdir, e))?;

        let base = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let timestamp = self.clock.epoch_ms();

        let mut backup = subdir.join(format!("{base}.{timestamp}.bak"));
        let mut n = 1;
        while backup.exists() {
            backup = subdir.join(format!("{base}.{timestamp}.{n}.bak"));
            n += 1;
        }

        std::fs::copy(target, &backup).map_err(|e| PatchError::io(&backup, e))?;
        Ok(backup)
    }

    /// Restore all applied patches in reverse order. Returns the number of
    /// files restored. The applied list is cleared afterwards.
    pub fn rollback(&mut self) -> usize {
        let mut restored = 0;

        for (patch, backup) in self.applied.iter().rev() {
            let Some(target) = self.resolve(&patch.file_path) else {
                continue;
            };
            if backup.exists() {
                match std::fs::copy(backup, &target) {
                    Ok(_) => {
                        tracing::info!(file = %patch.file_path, "rolled back");
                        restored += 1;
                    }
                    Err(e) => {
                        tracing::warn!(file = %patch.file_path, error = %e, "rollback failed");
                    }
                }
            } else {
                tracing::warn!(backup = %backup.display(), "backup missing during rollback");
            }
        }

        self.applied.clear();
        restored
    }

    /// Human-readable preview of what a patch would do, without applying.
    pub fn preview(&self, patch: &Patch, context: usize) -> String {
        let Some(target) = self.resolve(&patch.file_path) else {
            return format!("path escapes the workspace: {}", patch.file_path);
        };
        let contents = match std::fs::read_to_string(&target) {
            Ok(c) => c,
            Err(_) => return format!("file does not exist: {}", patch.file_path),
        };
        let lines: Vec<&str> = contents.lines().collect();

        let mut out = vec![
            format!("File: {}", patch.file_path),
            format!("Operation: {}", patch.patch_type),
            format!("Lines: {}-{}", patch.start_line, patch.end_line),
        ];
        if !patch.description.is_empty() {
            out.push(format!("Description: {}", patch.description));
        }

        out.push("\nBefore:".to_string());
        let start = (patch.start_line as usize).saturating_sub(1 + context);
        let end = (patch.end_line as usize + context).min(lines.len());
        for (i, line) in lines.iter().enumerate().take(end).skip(start) {
            let line_no = i + 1;
            let marker = if line_no >= patch.start_line as usize
                && line_no <= patch.end_line as usize
            {
                '>'
            } else {
                ' '
            };
            out.push(format!("{marker} {line_no:4} | {line}"));
        }

        if matches!(patch.patch_type, PatchType::Replace | PatchType::Insert) {
            out.push("\nAfter:".to_string());
            for (i, line) in patch.new_code.trim_end_matches('\n').split('\n').enumerate() {
                out.push(format!("+ {:4} | {}", patch.start_line as usize + i, line));
            }
        }

        out.join("\n")
    }

    /// Resolve a relative patch path inside the workspace, rejecting
    /// absolute paths and `..` traversal.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            return None;
        }
        if rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return None;
        }
        Some(self.workspace.join(rel))
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    target.with_file_name(format!("{name}{TMP_SUFFIX}"))
}

fn count_lines(contents: &str) -> usize {
    contents.split_inclusive('\n').count()
}

#[cfg(test)]
#[path = "applicator_tests.rs"]
mod tests;
