// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::VRFProof;
use fvm_ipld_encoding::tuple::*;

/// Proof that a miner won the leader election for a round. The proof itself
/// is opaque to the node; it is checked by the configured election verifier.
#[derive(
    Clone, Debug, PartialEq, PartialOrd, Eq, Default, Ord, Hash, Serialize_tuple, Deserialize_tuple,
)]
pub struct ElectionProof {
    /// Number of wins the miner claims for this round.
    pub win_count: i64,
    pub vrfproof: VRFProof,
}
