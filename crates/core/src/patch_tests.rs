// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn replace_patch() -> Patch {
    Patch {
        file_path: "src/calc.py".to_string(),
        patch_type: PatchType::Replace,
        start_line: 3,
        end_line: 3,
        new_code: "    return total + 1\n".to_string(),
        description: "fix off-by-one".to_string(),
    }
}

// ── Syntax validation ────────────────────────────────────────────────────────

#[test]
fn valid_replace_has_no_errors() {
    assert!(replace_patch().validate_syntax().is_empty());
}

#[test]
fn zero_start_line_rejected() {
    let mut patch = replace_patch();
    patch.start_line = 0;
    patch.end_line = 0;
    let errors = patch.validate_syntax();
    assert!(errors.iter().any(|e| e.contains("start_line")));
}

#[test]
fn end_before_start_rejected() {
    let mut patch = replace_patch();
    patch.start_line = 10;
    patch.end_line = 5;
    let errors = patch.validate_syntax();
    assert!(errors.iter().any(|e| e.contains("end_line")));
}

#[test]
fn replace_requires_new_code() {
    let mut patch = replace_patch();
    patch.new_code = String::new();
    let errors = patch.validate_syntax();
    assert!(errors.iter().any(|e| e.contains("new_code")));
}

#[test]
fn delete_does_not_require_new_code() {
    let mut patch = replace_patch();
    patch.patch_type = PatchType::Delete;
    patch.new_code = String::new();
    assert!(patch.validate_syntax().is_empty());
}

#[test]
fn empty_file_path_rejected() {
    let mut patch = replace_patch();
    patch.file_path = "  ".to_string();
    let errors = patch.validate_syntax();
    assert!(errors.iter().any(|e| e.contains("file_path")));
}

#[test]
fn empty_set_is_invalid() {
    let set = PatchSet::default();
    let errors = set.validate_syntax();
    assert!(errors.iter().any(|e| e.contains("no patches")));
}

#[test]
fn set_errors_are_indexed() {
    let mut bad = replace_patch();
    bad.new_code = String::new();
    let set = PatchSet {
        patches: vec![replace_patch(), bad],
        ..Default::default()
    };
    let errors = set.validate_syntax();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("patch 2:"));
}

// ── Serde ────────────────────────────────────────────────────────────────────

#[test]
fn patch_set_round_trips() {
    let set = PatchSet {
        patches: vec![replace_patch()],
        bug_description: "off-by-one in sum()".to_string(),
        confidence: 0.85,
        rationale: "loop bound excluded the last element".to_string(),
    };
    let json = serde_json::to_string(&set).unwrap();
    let restored: PatchSet = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, set);
}

#[test]
fn patch_type_uses_snake_case_tags() {
    assert_eq!(
        serde_json::to_string(&PatchType::Replace).unwrap(),
        "\"replace\""
    );
    let parsed: PatchType = serde_json::from_str("\"delete\"").unwrap();
    assert_eq!(parsed, PatchType::Delete);
}

#[test]
fn missing_optional_fields_default() {
    let json = r#"{
        "patches": [{
            "file_path": "a.py",
            "patch_type": "delete",
            "start_line": 1,
            "end_line": 2
        }]
    }"#;
    let set: PatchSet = serde_json::from_str(json).unwrap();
    assert_eq!(set.patches[0].new_code, "");
    assert_eq!(set.confidence, 0.0);
}
