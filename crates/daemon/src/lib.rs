// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! asa-daemon library: configuration, the inbound service facade, the
//! push channel, and the protocol DTOs. The `asad` binary wires these to
//! the engine; the HTTP frame consumes [`Service`] and [`watch_task`].

pub mod config;
pub mod env;
pub mod protocol;
pub mod service;
pub mod watch;

pub use config::{Config, ConfigError};
pub use protocol::{
    progress_percentage, HandleStatusResponse, ProgressResponse, StatsResponse, SubmitError,
    SubmitRequest, TaskDetail, TaskMessage,
};
pub use service::Service;
pub use watch::watch_task;
