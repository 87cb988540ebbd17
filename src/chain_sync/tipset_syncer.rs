// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;
use std::time::Duration;

use crate::blocks::{Block, CreateTipsetError, FullTipset, Tipset, TipsetKey};
use crate::chain::{
    ChainStore, Error as ChainStoreError, HeadChanges, TipsetMetadata, Weight, persist_messages,
};
use crate::chain_sync::consensus::{Consensus, ConsensusError, ParentTipset};
use crate::chain_sync::network_context::Fetcher;
use crate::chain_sync::sync_status::{
    ForkSyncInfo, StatusReporter, SyncStage, SyncStatusReport, SyncedGate,
};
use crate::chain_sync::{BadBlockCache, metrics};
use crate::clock::ChainClock;
use crate::db::SettingsStore;
use crate::metrics::HistogramTimerExt as _;
use crate::network::ChainInfo;
use crate::shim::clock::ChainEpoch;
use ahash::HashMap;
use chrono::{DateTime, Utc};
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Structure that defines syncing configuration options
#[serde_as]
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, SmartDefault)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of tipsets requested from the fetcher at once
    #[default(100)]
    pub request_window: usize,
    /// Fetch requests made for a single target before giving up
    #[default(50)]
    pub max_fetch_rounds: usize,
    /// Time allowed for a single fetch request
    #[default(Duration::from_secs(30))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub fetch_timeout: Duration,
    #[default(1 << 15)]
    pub bad_block_cache_size: usize,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetching {0} timed out")]
    FetchTimeout(TipsetKey),
    #[error("Querying tipsets from the network failed: {0}")]
    Fetch(String),
    #[error("No known tipset reached after {0} fetch rounds")]
    FetchLimitExceeded(usize),
    #[error("Chain {0} descends from a different genesis")]
    ForeignGenesis(TipsetKey),
    #[error("Block {cid} was previously marked bad: {reason}")]
    BadBlock { cid: Cid, reason: String },
    #[error("Fetched blocks do not form a tipset: {0}")]
    InvalidTipset(#[from] CreateTipsetError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error("Chain store error: {0}")]
    ChainStore(#[from] ChainStoreError),
    #[error("{0}")]
    Internal(String),
}

impl SyncError {
    /// Permanent errors are never retried for the same target.
    pub fn is_permanent(&self) -> bool {
        match self {
            SyncError::ForeignGenesis(_)
            | SyncError::BadBlock { .. }
            | SyncError::InvalidTipset(_) => true,
            SyncError::Consensus(e) => e.is_permanent(),
            _ => false,
        }
    }
}

/// How a sync request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The target was already validated.
    AlreadyKnown,
    /// Another pipeline is already working on the target.
    Deduplicated,
    /// The target became the head.
    Adopted(HeadChanges),
    /// The target was valid but lighter than the head, it is kept as a fork.
    ForkRetained,
    /// Shutdown or a heavier target interrupted the pipeline. Nothing was
    /// committed.
    Cancelled,
}

/// Keeps the pool and the outbox consistent with the canonical chain.
pub trait HeadChangeHandler: Send + Sync {
    fn handle_head_change(&self, changes: &HeadChanges) -> anyhow::Result<()>;
}

struct ActiveSync {
    epoch: ChainEpoch,
    weight: Weight,
    stage: SyncStage,
    cancel: CancellationToken,
    start_time: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

type ActiveSyncs = Mutex<HashMap<TipsetKey, ActiveSync>>;

/// Forgets a pipeline when its future completes or is dropped.
struct ActiveSyncGuard<'a> {
    active: &'a ActiveSyncs,
    key: TipsetKey,
}

impl Drop for ActiveSyncGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

/// Brings candidate chains announced by peers into the chain store:
/// fetches the missing segment, validates it oldest first and commits it,
/// moving the head when the segment wins the fork choice.
pub struct Syncer<DB> {
    cs: Arc<ChainStore<DB>>,
    consensus: Arc<dyn Consensus>,
    fetcher: Arc<dyn Fetcher>,
    clock: ChainClock,
    config: SyncConfig,
    bad_blocks: Arc<BadBlockCache>,
    status: Arc<StatusReporter>,
    synced: SyncedGate,
    handlers: Vec<Arc<dyn HeadChangeHandler>>,
    active: ActiveSyncs,
    shutdown: CancellationToken,
}

impl<DB> Syncer<DB>
where
    DB: Blockstore + SettingsStore + Send + Sync + 'static,
{
    pub fn new(
        cs: Arc<ChainStore<DB>>,
        consensus: Arc<dyn Consensus>,
        fetcher: Arc<dyn Fetcher>,
        clock: ChainClock,
        config: SyncConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let bad_blocks = Arc::new(BadBlockCache::new(
            std::num::NonZeroUsize::new(config.bad_block_cache_size)
                .unwrap_or(nonzero_ext::nonzero!(1usize)),
        ));
        Self {
            cs,
            consensus,
            fetcher,
            clock,
            config,
            bad_blocks,
            status: Arc::default(),
            synced: SyncedGate::default(),
            handlers: vec![],
            active: Mutex::default(),
            shutdown,
        }
    }

    /// Registers a component reconciled after every head change, in
    /// registration order.
    pub fn with_head_change_handler(mut self, handler: Arc<dyn HeadChangeHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn chain_store(&self) -> &Arc<ChainStore<DB>> {
        &self.cs
    }

    pub fn bad_blocks(&self) -> &Arc<BadBlockCache> {
        &self.bad_blocks
    }

    pub fn synced_gate(&self) -> &SyncedGate {
        &self.synced
    }

    pub fn status(&self) -> SyncStatusReport {
        self.status.report()
    }

    /// Syncs towards the announced head. At most one pipeline runs per
    /// target. Only validated tipsets are ever committed.
    pub async fn sync(&self, target: ChainInfo) -> Result<SyncOutcome, SyncError> {
        if self.cs.is_validated(&target.head)? {
            trace!("Target {} already validated", target.head);
            let report = self.refresh_status(None);
            self.open_gate_if_synced(&report);
            return Ok(SyncOutcome::AlreadyKnown);
        }
        let Some(cancel) = self.register(&target) else {
            trace!("Target {} is already being synced", target.head);
            return Ok(SyncOutcome::Deduplicated);
        };
        let _guard = ActiveSyncGuard {
            active: &self.active,
            key: target.head.clone(),
        };

        let result = self.run(&target, &cancel).await;
        match &result {
            Ok(outcome) => {
                debug!("Sync of {} from {} finished: {outcome:?}", target.head, target.source);
                let report = self.refresh_status(None);
                if matches!(outcome, SyncOutcome::Adopted(_)) {
                    self.open_gate_if_synced(&report);
                }
            }
            Err(e) => {
                warn!("Sync of {} from {} failed: {e}", target.head, target.source);
                self.set_stage(&target.head, SyncStage::Error);
                self.refresh_status(Some(e.to_string()));
            }
        }
        result
    }

    /// Recomputes the status report from the current head and clock.
    pub fn refresh_status(&self, error: Option<String>) -> SyncStatusReport {
        let head = self.cs.heaviest_tipset();
        self.status
            .update(&head, &self.clock, self.active_forks(), error)
    }

    /// The gate only opens after a successful sync reached a recent head.
    fn open_gate_if_synced(&self, report: &SyncStatusReport) {
        if report.is_synced() && self.synced.open() {
            info!("Chain synced at epoch {}", report.current_head_epoch);
        }
    }

    fn active_forks(&self) -> Vec<ForkSyncInfo> {
        self.active
            .lock()
            .iter()
            .map(|(key, active)| ForkSyncInfo {
                target_tipset_key: key.clone(),
                target_epoch: active.epoch,
                stage: active.stage,
                start_time: active.start_time,
                last_updated: active.last_updated,
            })
            .collect()
    }

    /// Returns a cancellation token for a new pipeline, or `None` when the
    /// target is already being synced. Lighter targets still fetching are
    /// cancelled.
    fn register(&self, target: &ChainInfo) -> Option<CancellationToken> {
        let mut active = self.active.lock();
        if active.contains_key(&target.head) {
            return None;
        }
        for (key, other) in active.iter() {
            if other.stage == SyncStage::Fetching && other.weight < target.weight {
                debug!("Cancelling sync of {key}, heavier target {} announced", target.head);
                other.cancel.cancel();
            }
        }
        let cancel = self.shutdown.child_token();
        let now = Utc::now();
        active.insert(
            target.head.clone(),
            ActiveSync {
                epoch: target.epoch,
                weight: target.weight.clone(),
                stage: SyncStage::Idle,
                cancel: cancel.clone(),
                start_time: now,
                last_updated: now,
            },
        );
        Some(cancel)
    }

    fn set_stage(&self, key: &TipsetKey, stage: SyncStage) {
        if let Some(active) = self.active.lock().get_mut(key) {
            trace!("Sync of {key}: {} -> {stage}", active.stage);
            active.stage = stage;
            active.last_updated = Utc::now();
        }
    }

    async fn run(
        &self,
        target: &ChainInfo,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        self.set_stage(&target.head, SyncStage::Fetching);
        let (base, segment) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SyncOutcome::Cancelled),
            segment = self.fetch_segment(&target.head) => segment?,
        };

        self.set_stage(&target.head, SyncStage::Validating);
        let Some(validated) = self.validate_segment(&base, &segment, cancel).await? else {
            return Ok(SyncOutcome::Cancelled);
        };

        self.set_stage(&target.head, SyncStage::Committing);
        self.commit(validated)
    }

    /// Walks back from `target` until the parent of the oldest fetched
    /// tipset is validated. Returns that parent and the fetched tipsets,
    /// oldest first.
    async fn fetch_segment(
        &self,
        target: &TipsetKey,
    ) -> Result<(TipsetKey, Vec<FullTipset>), SyncError> {
        let known = self.cs.heaviest_tipset().key().clone();
        let mut pending: Vec<FullTipset> = Vec::new();
        let mut cursor = target.clone();
        for round in 0..self.config.max_fetch_rounds {
            let blocks = tokio::time::timeout(
                self.config.fetch_timeout,
                self.fetcher
                    .fetch_tipset_segment(&cursor, &known, self.config.request_window),
            )
            .await
            .map_err(|_| SyncError::FetchTimeout(cursor.clone()))?
            .map_err(|e| SyncError::Fetch(e.to_string()))?;
            let tipsets = chain_tipsets(&cursor, blocks)?;
            debug!(
                "Fetch round {round} for {target}: {} tipsets from {cursor}",
                tipsets.len()
            );
            for fts in tipsets {
                self.reject_known_bad(&fts, &pending)?;
                if fts.parents().is_empty() {
                    // Our own genesis is always validated, so the walk never
                    // gets here for it.
                    return Err(SyncError::ForeignGenesis(fts.key().clone()));
                }
                cursor = fts.parents().clone();
                pending.push(fts);
                if self.cs.is_validated(&cursor)? {
                    pending.reverse();
                    return Ok((cursor, pending));
                }
            }
        }
        Err(SyncError::FetchLimitExceeded(self.config.max_fetch_rounds))
    }

    fn reject_known_bad(
        &self,
        fts: &FullTipset,
        descendants: &[FullTipset],
    ) -> Result<(), SyncError> {
        for block in fts.blocks().iter() {
            if let Some(reason) = self.bad_blocks.get(block.cid()) {
                self.mark_descendants_bad(fts.key(), descendants);
                return Err(SyncError::BadBlock {
                    cid: *block.cid(),
                    reason,
                });
            }
        }
        Ok(())
    }

    fn mark_descendants_bad<'a>(
        &self,
        ancestor: &TipsetKey,
        descendants: impl IntoIterator<Item = &'a FullTipset>,
    ) {
        for fts in descendants {
            for block in fts.blocks().iter() {
                self.bad_blocks
                    .push(*block.cid(), format!("descends from bad tipset {ancestor}"));
            }
        }
    }

    /// Validates `segment` on top of the validated tipset `base`. Returns
    /// `None` if cancelled. A permanent failure marks the offending blocks
    /// and every descendant bad.
    async fn validate_segment<'a>(
        &self,
        base: &TipsetKey,
        segment: &'a [FullTipset],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<(&'a FullTipset, TipsetMetadata)>>, SyncError> {
        let mut parent = ParentTipset {
            tipset: self.cs.load_tipset(base)?,
            metadata: self
                .cs
                .tipset_metadata(base)?
                .ok_or_else(|| ChainStoreError::NotFound(format!("metadata of {base}")))?,
        };
        let mut validated = Vec::with_capacity(segment.len());
        for (i, fts) in segment.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            match self.validate_tipset(fts, &parent).await {
                Ok(metadata) => {
                    parent = ParentTipset {
                        tipset: Arc::new(fts.to_tipset()),
                        metadata: metadata.clone(),
                    };
                    validated.push((fts, metadata));
                }
                Err(e) => {
                    if let SyncError::Consensus(err) = &e
                        && err.is_permanent()
                    {
                        metrics::INVALID_TIPSET_TOTAL.inc();
                        self.mark_invalid(fts, err);
                        self.mark_descendants_bad(fts.key(), &segment[i + 1..]);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Some(validated))
    }

    fn mark_invalid(&self, fts: &FullTipset, err: &ConsensusError) {
        match err {
            ConsensusError::InvalidBlock { cid, .. } => self.bad_blocks.push(*cid, err.to_string()),
            _ => {
                for block in fts.blocks().iter() {
                    self.bad_blocks.push(*block.cid(), err.to_string());
                }
            }
        }
    }

    /// Validates the blocks of a tipset in parallel, then weighs and executes
    /// it. Returns what the node learned executing it.
    async fn validate_tipset(
        &self,
        fts: &FullTipset,
        parent: &ParentTipset,
    ) -> Result<TipsetMetadata, SyncError> {
        let _timer = metrics::TIPSET_PROCESSING_TIME.start_timer();
        trace!("Validating tipset {} at epoch {}", fts.key(), fts.epoch());

        let mut validations = JoinSet::new();
        for block in fts.blocks().iter() {
            let consensus = self.consensus.clone();
            let parent = parent.clone();
            let block = Arc::new(block.clone());
            validations.spawn(async move {
                let _timer = metrics::BLOCK_VALIDATION_TIME.start_timer();
                consensus.validate_block(block, &parent).await
            });
        }
        let mut failure: Option<ConsensusError> = None;
        while let Some(result) = validations.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Report a permanent failure over a transient one.
                    if failure
                        .as_ref()
                        .is_none_or(|f| !f.is_permanent() && e.is_permanent())
                    {
                        failure = Some(e);
                    }
                }
                Err(e) => return Err(SyncError::Internal(e.to_string())),
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        let weight = self.consensus.weigh(&fts.to_tipset(), parent)?;
        let result = self.consensus.run_state_transition(fts, parent)?;
        Ok(TipsetMetadata {
            state_root: result.state_root,
            receipts_root: result.receipts_root,
            weight,
        })
    }

    /// Persists the validated segment and offers its tip to the fork choice.
    fn commit(
        &self,
        mut validated: Vec<(&FullTipset, TipsetMetadata)>,
    ) -> Result<SyncOutcome, SyncError> {
        let db = self.cs.blockstore();
        for (fts, _) in &validated {
            for block in fts.blocks().iter() {
                persist_messages(db, block.messages())?;
            }
        }
        let Some((tip, tip_metadata)) = validated.pop() else {
            return Ok(SyncOutcome::AlreadyKnown);
        };
        for (fts, metadata) in &validated {
            self.cs.put_tipset(&fts.to_tipset(), metadata)?;
        }

        let tipset = Arc::new(tip.to_tipset());
        let adopted = self
            .cs
            .update_heaviest_with(tipset.clone(), tip_metadata, |changes| {
                self.reconcile(changes)
            })?;
        match adopted {
            Some(changes) => {
                metrics::HEAD_EPOCH.set(tipset.epoch());
                Ok(SyncOutcome::Adopted(changes))
            }
            None => Ok(SyncOutcome::ForkRetained),
        }
    }

    /// Runs the head change handlers. Called with the head writer held so
    /// that handlers see head changes in commit order.
    fn reconcile(&self, changes: &HeadChanges) {
        let mut failures = Vec::new();
        for handler in &self.handlers {
            if let Err(e) = handler.handle_head_change(changes) {
                warn!("Reconciling head change failed: {e:#}");
                failures.push(format!("{e:#}"));
            }
        }
        self.status
            .set_reconcile_error((!failures.is_empty()).then(|| failures.join("; ")));
    }
}

/// Groups fetched blocks into tipsets following parent links from
/// `expected`, newest first. Fails if not even `expected` is complete.
fn chain_tipsets(expected: &TipsetKey, blocks: Vec<Block>) -> Result<Vec<FullTipset>, SyncError> {
    let mut by_cid: HashMap<Cid, Block> = blocks.into_iter().map(|b| (*b.cid(), b)).collect();
    let mut tipsets = Vec::new();
    let mut cursor = expected.clone();
    while !cursor.is_empty() {
        let Some(blocks) = cursor
            .iter()
            .map(|cid| by_cid.remove(cid))
            .collect::<Option<Vec<_>>>()
        else {
            break;
        };
        let fts = FullTipset::new(blocks)?;
        if fts.key() != &cursor {
            return Err(SyncError::Fetch(format!(
                "blocks for {cursor} form tipset {}",
                fts.key()
            )));
        }
        cursor = fts.parents().clone();
        tipsets.push(fts);
    }
    if tipsets.is_empty() {
        return Err(SyncError::Fetch(format!("incomplete tipset {expected}")));
    }
    Ok(tipsets)
}
