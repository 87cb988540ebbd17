// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use fvm_shared4::clock::ChainEpoch;

/// Default duration of each round in seconds.
pub const EPOCH_DURATION_SECONDS: i64 = 30;
/// Allowable clock drift for block timestamps, in seconds.
pub const ALLOWABLE_CLOCK_DRIFT: u64 = 1;
