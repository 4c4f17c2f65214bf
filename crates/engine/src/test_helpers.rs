// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: a store in a temp directory wired to
//! fake adapters.

use crate::config::EngineConfig;
use crate::orchestrator::{CancelProbe, Orchestrator, OrchestratorDeps};
use asa_adapters::{FakeForge, FakeGit, FakeIndex, FakeLlmProvider, FakeSandbox};
use asa_core::{Clock, Event, FakeClock, Priority, Submission, Task, TaskId};
use asa_gateway::{BudgetLimits, PromptStore};
use asa_storage::Store;
use std::sync::Arc;

pub type TestDeps =
    OrchestratorDeps<FakeLlmProvider, FakeSandbox, FakeGit, FakeForge, FakeIndex, FakeClock>;

pub struct Fixture {
    pub _dir: tempfile::TempDir,
    pub store: Store,
    pub provider: FakeLlmProvider,
    pub sandbox: FakeSandbox,
    pub git: FakeGit,
    pub forge: FakeForge,
    pub index: FakeIndex,
    pub clock: FakeClock,
    pub config: EngineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("state")).unwrap();
        let config = EngineConfig {
            workspace_root: dir.path().join("workspaces"),
            ..Default::default()
        };

        let git = FakeGit::new();
        git.seed_file("src/calc.py", "def add(a, b):\n    return a - b\n");

        Self {
            _dir: dir,
            store,
            provider: FakeLlmProvider::new(),
            sandbox: FakeSandbox::new(),
            git,
            forge: FakeForge::new(),
            index: FakeIndex::new(),
            clock: FakeClock::new(),
            config,
        }
    }

    pub fn deps(&self) -> TestDeps {
        OrchestratorDeps {
            store: self.store.clone(),
            provider: self.provider.clone(),
            sandbox: self.sandbox.clone(),
            git: self.git.clone(),
            forge: self.forge.clone(),
            index: self.index.clone(),
            prompts: Arc::new(PromptStore::builtin()),
            budget: BudgetLimits::default(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }

    /// Persist a fresh task and return its id.
    pub fn create_task(&self, id: &str) -> TaskId {
        let submission = Submission {
            repo_url: "https://example.com/acme/repo.git".to_string(),
            bug_description: "off-by-one in sum()".to_string(),
            test_command: Some("pytest".to_string()),
            principal: None,
            priority: Priority::Normal,
        };
        let task = Task::new(TaskId::new(id), submission, self.clock.epoch_ms());
        self.store
            .commit(Event::TaskCreated { task })
            .unwrap();
        TaskId::new(id)
    }

    pub fn orchestrator(
        &self,
        id: &TaskId,
    ) -> Orchestrator<FakeLlmProvider, FakeSandbox, FakeGit, FakeForge, FakeIndex, FakeClock> {
        Orchestrator::new(self.deps(), id.clone(), CancelProbe::never())
    }

    pub fn task(&self, id: &TaskId) -> Task {
        self.store.task(id.as_str()).unwrap()
    }

    /// Script the provider with a fix that corrects the seeded calc.py.
    pub fn script_good_fix(&self) {
        self.provider.push_text(good_fix_json(), 200, 100);
    }

    /// Script a full happy path: failing tests, a good fix, passing tests.
    pub fn script_happy_path(&self) {
        self.sandbox.push_exit(1, "1 failed: test_add");
        self.script_good_fix();
        self.sandbox.push_exit(0, "1 passed");
    }
}

/// A patch-set response that fixes the seeded `src/calc.py`.
pub fn good_fix_json() -> String {
    serde_json::json!({
        "patches": [{
            "file_path": "src/calc.py",
            "patch_type": "replace",
            "start_line": 2,
            "end_line": 2,
            "new_code": "    return a + b\n",
            "description": "add instead of subtract"
        }],
        "confidence": 0.9,
        "rationale": "the accumulator subtracted instead of adding",
        "bug_description": "off-by-one in sum()"
    })
    .to_string()
}

/// A behavioral-test response in the generator's schema.
pub fn behavioral_test_json() -> String {
    serde_json::json!({
        "test_name": "repro_sum",
        "test_code": "import sys\nsys.exit(0)\n"
    })
    .to_string()
}
