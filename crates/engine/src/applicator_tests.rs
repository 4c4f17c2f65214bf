// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use asa_core::FakeClock;

fn workspace_with(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (rel, contents) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
    dir
}

fn applicator(dir: &tempfile::TempDir) -> PatchApplicator<FakeClock> {
    PatchApplicator::new(dir.path(), FakeClock::new())
}

fn replace(file: &str, start: u32, end: u32, code: &str) -> Patch {
    Patch {
        file_path: file.to_string(),
        patch_type: PatchType::Replace,
        start_line: start,
        end_line: end,
        new_code: code.to_string(),
        description: String::new(),
    }
}

const CALC: &str = "def add(a, b):\n    return a - b\n\nprint(add(1, 2))\n";

// ── Apply semantics ──────────────────────────────────────────────────────────

#[test]
fn replace_splices_line_range() {
    let dir = workspace_with(&[("calc.py", CALC)]);
    let mut app = applicator(&dir);

    app.apply_patch(&replace("calc.py", 2, 2, "    return a + b\n"))
        .unwrap();

    let patched = std::fs::read_to_string(dir.path().join("calc.py")).unwrap();
    assert_eq!(patched, "def add(a, b):\n    return a + b\n\nprint(add(1, 2))\n");
}

#[test]
fn replace_multiple_lines_with_one_block() {
    let dir = workspace_with(&[("f.txt", "a\nb\nc\nd\n")]);
    let mut app = applicator(&dir);

    app.apply_patch(&replace("f.txt", 2, 3, "X\nY\n")).unwrap();

    let patched = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
    assert_eq!(patched, "a\nX\nY\nd\n");
}

#[test]
fn insert_places_code_before_start_line() {
    let dir = workspace_with(&[("f.txt", "one\ntwo\n")]);
    let mut app = applicator(&dir);

    let patch = Patch {
        file_path: "f.txt".to_string(),
        patch_type: PatchType::Insert,
        start_line: 2,
        end_line: 2,
        new_code: "inserted\n".to_string(),
        description: String::new(),
    };
    app.apply_patch(&patch).unwrap();

    let patched = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
    assert_eq!(patched, "one\ninserted\ntwo\n");
}

#[test]
fn delete_removes_line_range() {
    let dir = workspace_with(&[("f.txt", "a\nb\nc\n")]);
    let mut app = applicator(&dir);

    let patch = Patch {
        file_path: "f.txt".to_string(),
        patch_type: PatchType::Delete,
        start_line: 2,
        end_line: 3,
        new_code: String::new(),
        description: String::new(),
    };
    app.apply_patch(&patch).unwrap();

    assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\n");
}

#[test]
fn replacement_gains_trailing_newline() {
    let dir = workspace_with(&[("f.txt", "a\nb\n")]);
    let mut app = applicator(&dir);

    app.apply_patch(&replace("f.txt", 1, 1, "no-newline")).unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
        "no-newline\nb\n"
    );
}

// ── Validation ───────────────────────────────────────────────────────────────

#[test]
fn missing_file_fails_validation() {
    let dir = workspace_with(&[]);
    let app = applicator(&dir);
    let errors = app.validate_patch(&replace("ghost.py", 1, 1, "x\n"));
    assert!(errors.iter().any(|e| e.contains("does not exist")));
}

#[test]
fn range_beyond_file_length_fails() {
    let dir = workspace_with(&[("f.txt", "a\nb\n")]);
    let app = applicator(&dir);
    let errors = app.validate_patch(&replace("f.txt", 1, 3, "x\n"));
    assert!(errors.iter().any(|e| e.contains("exceeds file length")));
}

#[test]
fn replace_at_exact_last_line_succeeds_but_one_past_fails() {
    // Boundary: start = end = N on a file of N lines is valid; N+1 is not
    let dir = workspace_with(&[("f.txt", "a\nb\nc\n")]);
    let mut app = applicator(&dir);

    app.apply_patch(&replace("f.txt", 3, 3, "z\n")).unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nb\nz\n");

    let errors = app.validate_patch(&replace("f.txt", 4, 4, "w\n"));
    assert!(!errors.is_empty());
}

#[test]
fn path_traversal_is_rejected() {
    let dir = workspace_with(&[("f.txt", "a\n")]);
    let app = applicator(&dir);

    let errors = app.validate_patch(&replace("../outside.txt", 1, 1, "x\n"));
    assert!(errors.iter().any(|e| e.contains("escapes the workspace")));

    let errors = app.validate_patch(&replace("/etc/hosts", 1, 1, "x\n"));
    assert!(!errors.is_empty());
}

#[test]
fn apply_set_fail_fast_stops_at_first_error() {
    let dir = workspace_with(&[("f.txt", "a\nb\n")]);
    let mut app = applicator(&dir);

    let set = PatchSet {
        patches: vec![
            replace("ghost.py", 1, 1, "x\n"),
            replace("f.txt", 1, 1, "never applied\n"),
        ],
        ..Default::default()
    };
    let report = app.apply_set(&set, true);

    assert!(!report.success);
    assert_eq!(report.applied, 0);
    assert!(!report.errors.is_empty());
    // Second patch did not run
    assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "a\nb\n");
}

#[test]
fn apply_set_accumulates_when_not_fail_fast() {
    let dir = workspace_with(&[("f.txt", "a\nb\n")]);
    let mut app = applicator(&dir);

    let set = PatchSet {
        patches: vec![
            replace("ghost.py", 1, 1, "x\n"),
            replace("f.txt", 1, 1, "applied\n"),
        ],
        ..Default::default()
    };
    let report = app.apply_set(&set, false);

    assert!(!report.success);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "applied\nb\n");
}

// ── Backups and rollback ─────────────────────────────────────────────────────

#[test]
fn backup_mirrors_relative_path() {
    let dir = workspace_with(&[("src/deep/calc.py", CALC)]);
    let mut app = applicator(&dir);

    app.apply_patch(&replace("src/deep/calc.py", 2, 2, "    return a + b\n"))
        .unwrap();

    let backup_dir = dir.path().join(".asa_backups/src/deep");
    let backups: Vec<_> = std::fs::read_dir(&backup_dir).unwrap().collect();
    assert_eq!(backups.len(), 1);
    let name = backups[0].as_ref().unwrap().file_name();
    let name = name.to_string_lossy();
    assert!(name.starts_with("calc.py."));
    assert!(name.ends_with(".bak"));
}

#[test]
fn rollback_restores_byte_identical_content() {
    let dir = workspace_with(&[("a.txt", "a1\na2\n"), ("b.txt", "b1\nb2\nb3\n")]);
    let mut app = applicator(&dir);

    let set = PatchSet {
        patches: vec![
            replace("a.txt", 1, 1, "changed\n"),
            replace("b.txt", 2, 3, "rewritten\n"),
        ],
        ..Default::default()
    };
    let report = app.apply_set(&set, true);
    assert!(report.success);
    assert_eq!(app.applied_count(), 2);

    let restored = app.rollback();
    assert_eq!(restored, 2);
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "a1\na2\n");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("b.txt")).unwrap(),
        "b1\nb2\nb3\n"
    );
    // Applied list cleared: a second rollback is a no-op
    assert_eq!(app.rollback(), 0);
}

#[test]
fn rollback_handles_stacked_patches_on_one_file() {
    // Two patches on the same file under a frozen clock: rollback must
    // still restore the original bytes.
    let dir = workspace_with(&[("f.txt", "1\n2\n3\n")]);
    let mut app = applicator(&dir);

    let set = PatchSet {
        patches: vec![
            replace("f.txt", 1, 1, "one\n"),
            replace("f.txt", 2, 2, "two\n"),
        ],
        ..Default::default()
    };
    assert!(app.apply_set(&set, true).success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
        "one\ntwo\n3\n"
    );

    app.rollback();
    assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "1\n2\n3\n");
}

#[test]
fn without_backups_skips_backup_files() {
    let dir = workspace_with(&[("f.txt", "a\n")]);
    let mut app = applicator(&dir).without_backups();

    app.apply_patch(&replace("f.txt", 1, 1, "b\n")).unwrap();
    assert!(!dir.path().join(".asa_backups").exists());
    assert_eq!(app.applied_count(), 0);
}

// ── Preview ──────────────────────────────────────────────────────────────────

#[test]
fn preview_shows_before_and_after() {
    let dir = workspace_with(&[("calc.py", CALC)]);
    let app = applicator(&dir);

    let mut patch = replace("calc.py", 2, 2, "    return a + b\n");
    patch.description = "fix the operator".to_string();
    let preview = app.preview(&patch, 1);

    assert!(preview.contains("File: calc.py"));
    assert!(preview.contains("Operation: replace"));
    assert!(preview.contains("Description: fix the operator"));
    assert!(preview.contains(">    2 |     return a - b"));
    assert!(preview.contains("+    2 |     return a + b"));
    // File on disk untouched
    assert_eq!(std::fs::read_to_string(dir.path().join("calc.py")).unwrap(), CALC);
}

#[test]
fn preview_of_missing_file_reports_it() {
    let dir = workspace_with(&[]);
    let app = applicator(&dir);
    let preview = app.preview(&replace("nope.py", 1, 1, "x\n"), 2);
    assert!(preview.contains("does not exist"));
}
