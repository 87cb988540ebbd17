// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::{Block, CachingBlockHeader, Tipset};
use crate::chain::message_batch_cid;
use crate::chain_sync::consensus::{ParentTipset, collect_errs};
use crate::clock::ChainClock;
use crate::metrics::HistogramTimerExt as _;
use crate::networks::ProtocolRules;
use fvm_ipld_blockstore::Blockstore;
use nunny::Vec as NonEmpty;
use tokio::task::JoinSet;

use super::power::PowerTableView;
use super::{ExpectedConsensus, FilecoinConsensusError, metrics};

/// Validates a block against its parent: structure, timing, links to the
/// parent's execution results, the message batch, the miner's eligibility,
/// the election proof and every signature. Checks that need the pluggable
/// verifiers run concurrently and all their failures are reported.
pub(super) async fn validate_block<DB>(
    cns: &ExpectedConsensus<DB>,
    block: Arc<Block>,
    parent: &ParentTipset,
) -> Result<(), NonEmpty<FilecoinConsensusError>>
where
    DB: Blockstore + Send + Sync + 'static,
{
    let _timer = metrics::CONSENSUS_BLOCK_VALIDATION_TIME.start_timer();

    let header = block.header();
    let rules = cns.chain_config.rules(header.epoch);

    block_sanity_checks(header).map_err(|e| nunny::vec![e])?;
    block_timestamp_checks(header, &parent.tipset, &cns.clock, &rules)
        .map_err(|e| nunny::vec![e])?;
    parent_link_checks(header, parent).map_err(|e| nunny::vec![e])?;
    message_batch_checks(&block, &rules).map_err(|e| nunny::vec![e])?;

    let power = {
        let _timer = metrics::CONSENSUS_BLOCK_VALIDATION_TASKS_TIME
            .get_or_create(&metrics::values::VALIDATE_MINER)
            .start_timer();
        let power = PowerTableView::load(cns.db.as_ref(), &parent.metadata.state_root)
            .map_err(|e| nunny::vec![FilecoinConsensusError::StateLoad(e.to_string())])?;
        if !power.has_power(&header.miner_address) {
            return Err(nunny::vec![FilecoinConsensusError::MinerNotEligibleToMine(
                header.miner_address
            )]);
        }
        power
    };

    let randomness = parent
        .tipset
        .min_ticket()
        .ok_or_else(|| nunny::vec![FilecoinConsensusError::TipsetWithoutTicket])?
        .vrfproof
        .as_bytes()
        .to_vec();

    let mut validations = JoinSet::new();

    // Winner election
    let v_block = block.clone();
    let election_verifier = cns.election_verifier.clone();
    validations.spawn_blocking(move || -> Result<(), FilecoinConsensusError> {
        let _timer = metrics::CONSENSUS_BLOCK_VALIDATION_TASKS_TIME
            .get_or_create(&metrics::values::VALIDATE_WINNER_ELECTION)
            .start_timer();
        let header = v_block.header();
        let proof = header
            .election_proof
            .as_ref()
            .ok_or(FilecoinConsensusError::BlockWithoutElectionProof)?;
        match election_verifier.verify_election(
            proof,
            power.miner(&header.miner_address),
            power.total(),
            &randomness,
        ) {
            Ok(true) => Ok(()),
            Ok(false) => Err(FilecoinConsensusError::NotClaimingWin),
            Err(e) => Err(FilecoinConsensusError::VerifierUnavailable(e.to_string())),
        }
    });

    // Block signature
    let v_block = block.clone();
    let signature_verifier = cns.signature_verifier.clone();
    validations.spawn_blocking(move || -> Result<(), FilecoinConsensusError> {
        let _timer = metrics::CONSENSUS_BLOCK_VALIDATION_TASKS_TIME
            .get_or_create(&metrics::values::VALIDATE_BLOCK_SIGNATURE)
            .start_timer();
        let header = v_block.header();
        let signature = header
            .signature
            .as_ref()
            .ok_or(FilecoinConsensusError::BlockWithoutSignature)?;
        signature_verifier
            .verify(signature, &header.miner_address, &header.signing_bytes())
            .map_err(|e| FilecoinConsensusError::InvalidBlockSignature(e.to_string()))
    });

    // Message signatures
    let v_block = block;
    let signature_verifier = cns.signature_verifier.clone();
    validations.spawn_blocking(move || -> Result<(), FilecoinConsensusError> {
        let _timer = metrics::CONSENSUS_BLOCK_VALIDATION_TASKS_TIME
            .get_or_create(&metrics::values::VALIDATE_MESSAGES)
            .start_timer();
        for msg in v_block.messages() {
            signature_verifier.verify_message(msg).map_err(|e| {
                FilecoinConsensusError::InvalidMessageSignature(msg.cid(), e.to_string())
            })?;
        }
        Ok(())
    });

    collect_errs(validations).await
}

fn block_sanity_checks(header: &CachingBlockHeader) -> Result<(), FilecoinConsensusError> {
    if header.ticket.as_ref().is_none_or(|t| t.vrfproof.is_empty()) {
        return Err(FilecoinConsensusError::BlockWithoutTicket);
    }
    if header
        .election_proof
        .as_ref()
        .is_none_or(|p| p.vrfproof.is_empty())
    {
        return Err(FilecoinConsensusError::BlockWithoutElectionProof);
    }
    if header.signature.is_none() {
        return Err(FilecoinConsensusError::BlockWithoutSignature);
    }
    Ok(())
}

/// The epoch must match the round the node clock derives from the
/// timestamp, the block must not come from the future and it must be spaced
/// from its parent by at least one block delay per epoch.
fn block_timestamp_checks(
    header: &CachingBlockHeader,
    parent: &Tipset,
    clock: &ChainClock,
    rules: &ProtocolRules,
) -> Result<(), FilecoinConsensusError> {
    let expected = clock.epoch_at_time(header.timestamp);
    if expected != header.epoch {
        return Err(FilecoinConsensusError::EpochMismatch {
            epoch: header.epoch,
            expected,
        });
    }
    let now = clock.now();
    if header.timestamp > now + rules.allowable_clock_drift {
        return Err(FilecoinConsensusError::TimeTravellingBlock(
            now,
            header.timestamp,
        ));
    }
    if header.epoch <= parent.epoch() {
        return Err(FilecoinConsensusError::NotAfterParent(
            header.epoch,
            parent.epoch(),
        ));
    }
    let min_timestamp = parent.min_timestamp()
        + u64::from(clock.block_delay()) * (header.epoch - parent.epoch()) as u64;
    if header.timestamp < min_timestamp {
        return Err(FilecoinConsensusError::UnequalBlockTimestamps(
            header.timestamp,
            min_timestamp,
        ));
    }
    Ok(())
}

fn parent_link_checks(
    header: &CachingBlockHeader,
    parent: &ParentTipset,
) -> Result<(), FilecoinConsensusError> {
    if &header.parents != parent.tipset.key() {
        return Err(FilecoinConsensusError::ParentMismatch);
    }
    if header.weight != parent.metadata.weight {
        return Err(FilecoinConsensusError::ParentWeightMismatch {
            claimed: header.weight.clone(),
            computed: parent.metadata.weight.clone(),
        });
    }
    if header.state_root != parent.metadata.state_root {
        return Err(FilecoinConsensusError::StateRootMismatch {
            claimed: header.state_root,
            computed: parent.metadata.state_root,
        });
    }
    if header.message_receipts != parent.metadata.receipts_root {
        return Err(FilecoinConsensusError::ReceiptsRootMismatch {
            claimed: header.message_receipts,
            computed: parent.metadata.receipts_root,
        });
    }
    Ok(())
}

fn message_batch_checks(block: &Block, rules: &ProtocolRules) -> Result<(), FilecoinConsensusError> {
    if block.messages().len() > rules.block_message_limit {
        return Err(FilecoinConsensusError::TooManyMessages(
            block.messages().len(),
            rules.block_message_limit,
        ));
    }
    let computed = message_batch_cid(block.messages())
        .map_err(|e| FilecoinConsensusError::StateLoad(e.to_string()))?;
    if computed != block.header().messages {
        return Err(FilecoinConsensusError::MessageBatchMismatch {
            claimed: block.header().messages,
            computed,
        });
    }
    Ok(())
}
