// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{behavioral_test_json, good_fix_json, Fixture};
use asa_core::Purpose;

mod cancellation;
mod pipeline;
mod retries;
