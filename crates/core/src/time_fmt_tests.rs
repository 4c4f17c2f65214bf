// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    millis = { 450, "450ms" },
    seconds = { 12_000, "12s" },
    just_under_minute = { 59_999, "59s" },
    minutes = { 184_000, "3m04s" },
    hours = { 8_100_000, "2h15m" },
    zero = { 0, "0ms" },
)]
fn formats(ms: u64, expected: &str) {
    assert_eq!(format_elapsed_ms(ms), expected);
}
