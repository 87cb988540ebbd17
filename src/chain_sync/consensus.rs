// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::{Block, FullTipset, Tipset};
use crate::chain::{TipsetMetadata, Weight};
use crate::interpreter::ApplyResult;
use async_trait::async_trait;
use cid::Cid;
use nunny::Vec as NonEmpty;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

/// A validated tipset together with what the node learned executing it.
/// Children of this tipset are checked against it.
#[derive(Clone, Debug)]
pub struct ParentTipset {
    pub tipset: Arc<Tipset>,
    pub metadata: TipsetMetadata,
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("block {cid} is invalid: {reason}")]
    InvalidBlock { cid: Cid, reason: String },
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("verifier unavailable: {0}")]
    VerifierUnavailable(String),
    #[error("store error: {0}")]
    Store(String),
}

impl ConsensusError {
    /// Permanent failures make the block bad forever, transient ones are
    /// retried on the next trigger.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ConsensusError::InvalidBlock { .. } | ConsensusError::InvalidTransition(_)
        )
    }
}

/// The consensus rules the syncer validates candidate chains against.
#[async_trait]
pub trait Consensus: Send + Sync + 'static {
    /// Checks a single block against its validated parent.
    async fn validate_block(
        &self,
        block: Arc<Block>,
        parent: &ParentTipset,
    ) -> Result<(), ConsensusError>;

    /// Weight of `tipset` on top of `parent`. Strictly greater than the
    /// parent weight.
    fn weigh(&self, tipset: &Tipset, parent: &ParentTipset) -> Result<Weight, ConsensusError>;

    /// Applies the messages of `tipset` to the state of `parent`.
    fn run_state_transition(
        &self,
        tipset: &FullTipset,
        parent: &ParentTipset,
    ) -> Result<ApplyResult, ConsensusError>;
}

/// Helper function to collect errors from async validations. A task that
/// panicked or was aborted counts as a failed validation.
pub async fn collect_errs<E>(mut handles: JoinSet<Result<(), E>>) -> Result<(), NonEmpty<E>>
where
    E: From<JoinError> + 'static,
{
    let mut errors = Vec::new();

    while let Some(result) = handles.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(e),
            Err(e) => errors.push(E::from(e)),
        }
    }

    match errors.try_into() {
        Ok(it) => Err(it),
        Err(_) => Ok(()),
    }
}
