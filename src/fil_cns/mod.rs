// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Expected consensus: power-weighted leader election with a fork-choice
//! rule based on accumulated weight.

use std::sync::Arc;

use crate::blocks::{Block, FullTipset, Tipset};
use crate::chain::Weight;
use crate::chain_sync::consensus::{Consensus, ConsensusError, ParentTipset};
use crate::clock::ChainClock;
use crate::interpreter::{self, ApplyResult, Processor};
use crate::key_management::SignatureVerifier;
use crate::networks::ChainConfig;
use crate::shim::{address::Address, clock::ChainEpoch};
use async_trait::async_trait;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use itertools::Itertools as _;
use nunny::Vec as NonEmpty;
use thiserror::Error;

mod metrics;
mod power;
mod validation;
mod verifier;
mod weight;

pub use power::PowerTableView;
pub use verifier::{EXPECTED_LEADERS_PER_EPOCH, ElectionVerifier, PowerLotteryVerifier};
pub use weight::weight;

#[derive(Debug, Error)]
pub enum FilecoinConsensusError {
    #[error("Block must have an election proof included in tipset")]
    BlockWithoutElectionProof,
    #[error("Block without ticket")]
    BlockWithoutTicket,
    #[error("Block without signature")]
    BlockWithoutSignature,
    #[error("Block had the wrong timestamp: {0} < {1}")]
    UnequalBlockTimestamps(u64, u64),
    #[error("Block epoch {epoch} does not match the round of its timestamp ({expected})")]
    EpochMismatch {
        epoch: ChainEpoch,
        expected: ChainEpoch,
    },
    #[error("Block was generated too far in the future: now {0}, block {1}")]
    TimeTravellingBlock(u64, u64),
    #[error("Block epoch {0} is not after its parent epoch {1}")]
    NotAfterParent(ChainEpoch, ChainEpoch),
    #[error("Block parents do not match the parent tipset")]
    ParentMismatch,
    #[error("Parent weight mismatch: block claims {claimed}, computed {computed}")]
    ParentWeightMismatch { claimed: Weight, computed: Weight },
    #[error("Parent state root mismatch: block claims {claimed}, computed {computed}")]
    StateRootMismatch { claimed: Cid, computed: Cid },
    #[error("Parent receipts root mismatch: block claims {claimed}, computed {computed}")]
    ReceiptsRootMismatch { claimed: Cid, computed: Cid },
    #[error("Block carries {0} messages, limit is {1}")]
    TooManyMessages(usize, usize),
    #[error("Message batch mismatch: block claims {claimed}, computed {computed}")]
    MessageBatchMismatch { claimed: Cid, computed: Cid },
    #[error("Tipset without ticket to verify")]
    TipsetWithoutTicket,
    #[error("Miner {0} isn't elligible to mine")]
    MinerNotEligibleToMine(Address),
    #[error("Block is not claiming to be a winner")]
    NotClaimingWin,
    #[error("Election verifier unavailable: {0}")]
    VerifierUnavailable(String),
    #[error("Block signature invalid: {0}")]
    InvalidBlockSignature(String),
    #[error("Message {0} signature invalid: {1}")]
    InvalidMessageSignature(Cid, String),
    #[error("Loading the parent state failed: {0}")]
    StateLoad(String),
}

impl From<tokio::task::JoinError> for FilecoinConsensusError {
    fn from(e: tokio::task::JoinError) -> Self {
        FilecoinConsensusError::VerifierUnavailable(format!("validation task failed: {e}"))
    }
}

impl FilecoinConsensusError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            FilecoinConsensusError::VerifierUnavailable(_) | FilecoinConsensusError::StateLoad(_)
        )
    }
}

/// Groups the validation failures of one block into a single consensus
/// error. A block that fails any definitive check is invalid even if some
/// verifier was unreachable.
fn classify(cid: Cid, errors: NonEmpty<FilecoinConsensusError>) -> ConsensusError {
    let (transient, permanent): (Vec<_>, Vec<_>) =
        errors.into_iter().partition(|e| e.is_transient());
    if !permanent.is_empty() {
        return ConsensusError::InvalidBlock {
            cid,
            reason: permanent.iter().join(", "),
        };
    }
    match transient.iter().find(|e| matches!(e, FilecoinConsensusError::StateLoad(_))) {
        Some(e) => ConsensusError::Store(e.to_string()),
        None => ConsensusError::VerifierUnavailable(transient.iter().join(", ")),
    }
}

pub struct ExpectedConsensus<DB> {
    db: Arc<DB>,
    chain_config: Arc<ChainConfig>,
    clock: ChainClock,
    election_verifier: Arc<dyn ElectionVerifier>,
    signature_verifier: Arc<dyn SignatureVerifier>,
    processor: Processor,
}

impl<DB> ExpectedConsensus<DB> {
    pub fn new(
        db: Arc<DB>,
        chain_config: Arc<ChainConfig>,
        clock: ChainClock,
        election_verifier: Arc<dyn ElectionVerifier>,
        signature_verifier: Arc<dyn SignatureVerifier>,
        processor: Processor,
    ) -> Self {
        Self {
            db,
            chain_config,
            clock,
            election_verifier,
            signature_verifier,
            processor,
        }
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }
}

impl<DB> std::fmt::Debug for ExpectedConsensus<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectedConsensus")
            .field("network", &self.chain_config.network)
            .field("clock", &self.clock)
            .finish()
    }
}

#[async_trait]
impl<DB> Consensus for ExpectedConsensus<DB>
where
    DB: Blockstore + Send + Sync + 'static,
{
    async fn validate_block(
        &self,
        block: Arc<Block>,
        parent: &ParentTipset,
    ) -> Result<(), ConsensusError> {
        let cid = *block.cid();
        validation::validate_block(self, block, parent)
            .await
            .map_err(|errs| classify(cid, errs))
    }

    fn weigh(&self, tipset: &Tipset, parent: &ParentTipset) -> Result<Weight, ConsensusError> {
        let power = PowerTableView::load(self.db.as_ref(), &parent.metadata.state_root)
            .map_err(|e| ConsensusError::Store(e.to_string()))?;
        Ok(weight(&parent.metadata.weight, &power, tipset))
    }

    fn run_state_transition(
        &self,
        tipset: &FullTipset,
        parent: &ParentTipset,
    ) -> Result<ApplyResult, ConsensusError> {
        self.processor
            .apply_tipset(self.db.as_ref(), tipset, &parent.metadata.state_root)
            .map_err(|e| match e {
                interpreter::Error::InvalidTransition(reason) => {
                    ConsensusError::InvalidTransition(reason)
                }
                interpreter::Error::Lookup(e) => ConsensusError::Store(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockVerifier, TestChain};
    use num_bigint::BigInt;

    #[tokio::test]
    async fn valid_child_of_genesis_passes() {
        let chain = TestChain::new();
        let block = Arc::new(chain.child_block(&chain.genesis_parent(), 1000, 1, vec![]));
        chain
            .consensus()
            .validate_block(block, &chain.genesis_parent())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_ticket_is_permanent() {
        let chain = TestChain::new();
        let parent = chain.genesis_parent();
        let block = chain.child_block_with(&parent, 1000, 1, vec![], |h| h.ticket = None);
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(err.is_permanent(), "{err}");
    }

    #[tokio::test]
    async fn future_block_is_rejected() {
        let chain = TestChain::new();
        let parent = chain.genesis_parent();
        // Epoch 3 is two rounds ahead of the clock.
        let block = chain.child_block(&parent, 1000, 3, vec![]);
        chain.clock.set(chain.chain_clock().epoch_start(1));
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidBlock { .. }), "{err}");
    }

    #[tokio::test]
    async fn wrong_parent_weight_is_rejected() {
        let chain = TestChain::new();
        let parent = chain.genesis_parent();
        let block = chain.child_block_with(&parent, 1000, 1, vec![], |h| h.weight += BigInt::from(1));
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("weight"), "{err}");
    }

    #[tokio::test]
    async fn miner_without_power_is_rejected() {
        let chain = TestChain::new();
        let parent = chain.genesis_parent();
        let block = chain.child_block(&parent, 4242, 1, vec![]);
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("elligible"), "{err}");
    }

    #[tokio::test]
    async fn unreachable_verifier_is_transient() {
        let chain = TestChain::with_verifier(MockVerifier::Unavailable);
        let parent = chain.genesis_parent();
        let block = chain.child_block(&parent, 1000, 1, vec![]);
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::VerifierUnavailable(_)), "{err}");
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn crashing_verifier_never_passes() {
        let chain = TestChain::with_verifier(MockVerifier::Panic);
        let parent = chain.genesis_parent();
        let block = chain.child_block(&parent, 1000, 1, vec![]);
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::VerifierUnavailable(_)), "{err}");
    }

    #[tokio::test]
    async fn losing_election_is_permanent() {
        let chain = TestChain::with_verifier(MockVerifier::Reject);
        let parent = chain.genesis_parent();
        let block = chain.child_block(&parent, 1000, 1, vec![]);
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn tampered_message_batch_is_rejected() {
        let chain = TestChain::new();
        let parent = chain.genesis_parent();
        let mut block = chain.child_block(&parent, 1000, 1, vec![chain.message(0, 10)]);
        block.messages.push(chain.message(1, 10));
        let err = chain
            .consensus()
            .validate_block(Arc::new(block), &parent)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Message batch"), "{err}");
    }

    #[test]
    fn weight_increases_from_genesis() {
        let chain = TestChain::new();
        let parent = chain.genesis_parent();
        let block = chain.child_block(&parent, 1000, 1, vec![]);
        let ts = Tipset::from(block.header);
        let w = chain.consensus().weigh(&ts, &parent).unwrap();
        assert!(w > parent.metadata.weight);
    }
}
