// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn runs_command_in_workspace() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "present").unwrap();

    let output = LocalSandbox
        .run_command(
            dir.path(),
            "cat marker.txt",
            Duration::from_secs(5),
            &SandboxLimits::default(),
        )
        .await
        .unwrap();

    assert!(output.success());
    assert_eq!(output.stdout.trim(), "present");
}

#[tokio::test]
async fn nonzero_exit_is_reported_not_errored() {
    let dir = tempfile::tempdir().unwrap();
    let output = LocalSandbox
        .run_command(
            dir.path(),
            "echo failing >&2; exit 3",
            Duration::from_secs(5),
            &SandboxLimits::default(),
        )
        .await
        .unwrap();

    assert!(!output.success());
    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stderr.trim(), "failing");
}

#[tokio::test]
async fn pipeline_failures_propagate_via_pipefail() {
    let dir = tempfile::tempdir().unwrap();
    let output = LocalSandbox
        .run_command(
            dir.path(),
            "false | cat",
            Duration::from_secs(5),
            &SandboxLimits::default(),
        )
        .await
        .unwrap();
    assert!(!output.success());
}

#[tokio::test]
async fn timeout_maps_to_timeout_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = LocalSandbox
        .run_command(
            dir.path(),
            "sleep 5",
            Duration::from_millis(50),
            &SandboxLimits::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)));
}

#[test]
fn combined_output_joins_streams() {
    let output = CommandOutput {
        exit_code: 1,
        stdout: "out".to_string(),
        stderr: "err".to_string(),
    };
    assert_eq!(output.combined(), "out\nerr");

    let empty_stdout = CommandOutput {
        exit_code: 0,
        stdout: String::new(),
        stderr: "only err".to_string(),
    };
    assert_eq!(empty_stdout.combined(), "only err");
}

#[tokio::test]
async fn fake_replays_and_records() {
    let fake = FakeSandbox::new();
    fake.push_exit(1, "2 failed");

    let dir = tempfile::tempdir().unwrap();
    let output = fake
        .run_command(
            dir.path(),
            "pytest",
            Duration::from_secs(1),
            &SandboxLimits::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.exit_code, 1);
    assert_eq!(fake.calls().len(), 1);
    assert_eq!(fake.calls()[0].command, "pytest");
}
