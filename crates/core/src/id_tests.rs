// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    /// Test-only ID type.
    pub struct ProbeId;
}

#[test]
fn new_and_as_str() {
    let id = ProbeId::new("task-abc123");
    assert_eq!(id.as_str(), "task-abc123");
    assert_eq!(id.to_string(), "task-abc123");
}

#[test]
fn short_truncates() {
    let id = ProbeId::new("abcdefghij");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefghij");
}

#[test]
fn str_comparisons() {
    let id = ProbeId::new("x-1");
    assert_eq!(id, "x-1");
    assert_eq!(id, *"x-1");
    assert_ne!(id, "x-2");
}

#[test]
fn short_id_on_str() {
    assert_eq!("abcdef".short(3), "abc");
    assert_eq!("ab".short(3), "ab");
}

#[test]
fn uuid_gen_is_unique() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("task");
    assert_eq!(gen.next(), "task-1");
    assert_eq!(gen.next(), "task-2");
    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "task-3");
}

#[test]
fn id_serde_is_transparent_string() {
    let id = ProbeId::new("p-9");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"p-9\"");
    let restored: ProbeId = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, id);
}
