// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Code index adapter.
//!
//! The semantic index is an external collaborator behind this trait;
//! `LexicalIndex` is the in-process fallback the pipeline degrades to when
//! the semantic build fails. It scans source files and ranks them by
//! query-term overlap.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors from index operations.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("index build failed: {0}")]
    BuildFailed(String),
    #[error("index not built")]
    NotBuilt,
}

/// Build statistics, reported in the task log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub lines: usize,
}

/// Adapter for building and querying a code index over one workspace.
#[async_trait]
pub trait CodeIndex: Clone + Send + Sync + 'static {
    async fn build(&self, workspace: &Path) -> Result<IndexStats, IndexError>;

    /// Render a code context for the query: the best-matching snippets,
    /// or a file listing when nothing matches.
    async fn context(&self, query: &str, max_results: usize) -> Result<String, IndexError>;
}

/// Directories never worth indexing.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "venv",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

/// File extensions treated as source code.
const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "rs", "js", "ts", "go", "java", "rb", "c", "cc", "cpp", "h", "hpp", "cs", "php",
];

/// Snippet context lines around the best-matching line.
const SNIPPET_RADIUS: usize = 10;

/// Cap on indexed files, to bound memory on large repositories.
const MAX_FILES: usize = 2_000;

/// Term-overlap lexical index.
#[derive(Clone, Default)]
pub struct LexicalIndex {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_source_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e))
            .unwrap_or(false)
    }

    fn collect_files(root: &Path, dir: &Path, out: &mut HashMap<PathBuf, String>) {
        if out.len() >= MAX_FILES {
            return;
        }
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if SKIP_DIRS.contains(&name.as_ref()) {
                    continue;
                }
                Self::collect_files(root, &path, out);
            } else if Self::is_source_file(&path) {
                if out.len() >= MAX_FILES {
                    return;
                }
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    if let Ok(rel) = path.strip_prefix(root) {
                        out.insert(rel.to_path_buf(), contents);
                    }
                }
            }
        }
    }

    fn query_terms(query: &str) -> Vec<String> {
        query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect()
    }

    /// Score a file and find the line of its densest match.
    fn score_file(contents: &str, terms: &[String]) -> (usize, usize) {
        let mut best_line = 0;
        let mut best_line_score = 0;
        let mut total = 0;

        for (line_no, line) in contents.lines().enumerate() {
            let lowered = line.to_lowercase();
            let score = terms.iter().filter(|t| lowered.contains(t.as_str())).count();
            total += score;
            if score > best_line_score {
                best_line_score = score;
                best_line = line_no;
            }
        }

        (total, best_line)
    }

    fn snippet(path: &Path, contents: &str, center_line: usize) -> String {
        let lines: Vec<&str> = contents.lines().collect();
        let start = center_line.saturating_sub(SNIPPET_RADIUS);
        let end = (center_line + SNIPPET_RADIUS + 1).min(lines.len());
        format!(
            "### {} (lines {}-{})\n```\n{}\n```",
            path.display(),
            start + 1,
            end,
            lines[start..end].join("\n")
        )
    }

    fn file_list_fallback(files: &HashMap<PathBuf, String>) -> String {
        let mut names: Vec<String> = files.keys().map(|p| p.display().to_string()).collect();
        names.sort();
        names.truncate(20);
        format!(
            "### File list (first {} source files)\n{}",
            names.len(),
            names
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    }
}

#[async_trait]
impl CodeIndex for LexicalIndex {
    async fn build(&self, workspace: &Path) -> Result<IndexStats, IndexError> {
        if !workspace.is_dir() {
            return Err(IndexError::BuildFailed(format!(
                "workspace does not exist: {}",
                workspace.display()
            )));
        }

        let mut files = HashMap::new();
        Self::collect_files(workspace, workspace, &mut files);
        let lines = files.values().map(|c| c.lines().count()).sum();
        let stats = IndexStats {
            files: files.len(),
            lines,
        };

        *self.files.lock() = files;
        Ok(stats)
    }

    async fn context(&self, query: &str, max_results: usize) -> Result<String, IndexError> {
        let files = self.files.lock();
        if files.is_empty() {
            return Err(IndexError::NotBuilt);
        }

        let terms = Self::query_terms(query);
        let mut scored: Vec<(usize, &PathBuf, usize)> = files
            .iter()
            .map(|(path, contents)| {
                let (score, best_line) = Self::score_file(contents, &terms);
                (score, path, best_line)
            })
            .filter(|(score, _, _)| *score > 0)
            .collect();

        // Highest score first, path as tiebreaker for determinism
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.truncate(max_results);

        if scored.is_empty() {
            return Ok(Self::file_list_fallback(&files));
        }

        let snippets: Vec<String> = scored
            .iter()
            .map(|(_, path, best_line)| {
                let contents = &files[*path];
                Self::snippet(path, contents, *best_line)
            })
            .collect();

        Ok(snippets.join("\n\n"))
    }
}

// ── Fake index (test support) ────────────────────────────────────────────────

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeIndex;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    /// Scripted index: optionally fails `build`, returns a canned context.
    #[derive(Clone, Default)]
    pub struct FakeIndex {
        inner: Arc<Mutex<FakeIndexState>>,
    }

    #[derive(Default)]
    struct FakeIndexState {
        build_error: Option<IndexError>,
        context: String,
    }

    impl FakeIndex {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_build(&self, error: IndexError) {
            self.inner.lock().build_error = Some(error);
        }

        pub fn set_context(&self, context: impl Into<String>) {
            self.inner.lock().context = context.into();
        }
    }

    #[async_trait]
    impl CodeIndex for FakeIndex {
        async fn build(&self, _workspace: &Path) -> Result<IndexStats, IndexError> {
            let mut state = self.inner.lock();
            if let Some(error) = state.build_error.take() {
                return Err(error);
            }
            Ok(IndexStats { files: 1, lines: 1 })
        }

        async fn context(&self, _query: &str, _max_results: usize) -> Result<String, IndexError> {
            Ok(self.inner.lock().context.clone())
        }
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
