// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::ElectionProof;
use crate::state_tree::StoragePower;
use crate::utils::encoding::blake2b_256;
use num_bigint::BigUint;

/// Expected number of winners per round.
pub const EXPECTED_LEADERS_PER_EPOCH: u64 = 5;

/// Checks that a miner won the leader election of a round.
///
/// An `Err` means the verifier could not reach a decision, which callers
/// treat as transient. `Ok(false)` is a definitive rejection.
pub trait ElectionVerifier: Send + Sync {
    fn verify_election(
        &self,
        proof: &ElectionProof,
        miner_power: StoragePower,
        total_power: u128,
        randomness: &[u8],
    ) -> anyhow::Result<bool>;
}

/// Power-proportional lottery. A miner wins when the digest of the
/// randomness and its proof, read as a 256 bit fraction, is below its share of
/// the power times the expected number of leaders.
///
/// The proof bytes are not checked against the miner's key, so a miner can
/// grind proofs until one wins. Only suitable for dev networks, production
/// networks need a verifier that checks the VRF output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PowerLotteryVerifier;

impl ElectionVerifier for PowerLotteryVerifier {
    fn verify_election(
        &self,
        proof: &ElectionProof,
        miner_power: StoragePower,
        total_power: u128,
        randomness: &[u8],
    ) -> anyhow::Result<bool> {
        if proof.win_count < 1 || proof.vrfproof.is_empty() || total_power == 0 {
            return Ok(false);
        }
        let mut input = randomness.to_vec();
        input.extend_from_slice(proof.vrfproof.as_bytes());
        let digest = BigUint::from_bytes_be(&blake2b_256(&input));
        let lhs = digest * total_power;
        let rhs = (BigUint::from(miner_power) * EXPECTED_LEADERS_PER_EPOCH) << 256u32;
        Ok(lhs < rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::VRFProof;

    fn proof(win_count: i64) -> ElectionProof {
        ElectionProof {
            win_count,
            vrfproof: VRFProof::new(b"proof".to_vec()),
        }
    }

    #[test]
    fn dominant_miner_always_wins() {
        // With the whole power and five expected leaders every draw wins.
        assert!(PowerLotteryVerifier.verify_election(&proof(1), 10, 10, b"r").unwrap());
    }

    #[test]
    fn powerless_or_claimless_miner_loses() {
        assert!(!PowerLotteryVerifier.verify_election(&proof(1), 0, 10, b"r").unwrap());
        assert!(!PowerLotteryVerifier.verify_election(&proof(0), 10, 10, b"r").unwrap());
        assert!(!PowerLotteryVerifier.verify_election(&proof(1), 10, 0, b"r").unwrap());
    }
}
