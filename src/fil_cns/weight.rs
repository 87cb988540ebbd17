// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::Tipset;
use crate::chain::Weight;
use num_bigint::BigInt;

use super::power::PowerTableView;

/// Fixed part of the weight every block adds.
const ECV: u64 = 10;
/// Scale of the power-proportional part.
const ECPRM: u64 = 100;
/// Fixed point precision, in bits.
const PRECISION: u32 = 8;

/// Returns the weight of `ts` built on a parent of weight `parent_weight`:
/// `w = parent + Σ blocks (ECV + ECPRM * minerPower / totalPower)` computed
/// in fixed point. Every block adds at least `ECV`, so the weight strictly
/// increases with height.
pub fn weight(parent_weight: &Weight, power: &PowerTableView, ts: &Tipset) -> Weight {
    let total = power.total();
    ts.block_headers()
        .iter()
        .fold(parent_weight.clone(), |acc, header| {
            let fixed = BigInt::from(ECV) << PRECISION;
            let proportional = if total == 0 {
                BigInt::from(0)
            } else {
                (BigInt::from(ECPRM) << PRECISION) * power.miner(&header.miner_address) / total
            };
            acc + fixed + proportional
        })
}
