// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::{Tipset, TipsetKey};
use crate::clock::ChainClock;
use crate::shim::clock::ChainEpoch;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::trace;

// Node considered synced if the head is within this threshold.
pub const SYNCED_EPOCH_THRESHOLD: ChainEpoch = 10;

/// Represents the overall synchronization status of the node.
#[derive(Debug, Clone, Default, PartialEq, Eq, strum::Display)]
pub enum NodeSyncStatus {
    /// Node is initializing, status not yet determined.
    #[default]
    #[strum(to_string = "Initializing")]
    Initializing,
    /// Node is behind the clock and catching up.
    #[strum(to_string = "Syncing")]
    Syncing,
    /// Head is within [`SYNCED_EPOCH_THRESHOLD`] of the current epoch.
    #[strum(to_string = "Ready")]
    Ready,
    /// The last sync attempt failed.
    #[strum(to_string = "Error: {0}")]
    Error(String),
}

/// Stage of a sync pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum SyncStage {
    #[default]
    Idle,
    /// Fetching headers and messages back to a known tipset.
    #[strum(to_string = "Fetching")]
    Fetching,
    /// Validating tipsets oldest first.
    #[strum(to_string = "Validating")]
    Validating,
    /// Persisting the segment and moving the head.
    #[strum(to_string = "Committing")]
    Committing,
    #[strum(to_string = "Error")]
    Error,
}

/// A chain the node is actively syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSyncInfo {
    pub target_tipset_key: TipsetKey,
    pub target_epoch: ChainEpoch,
    pub stage: SyncStage,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Contains information about the current status of the node's synchronization process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusReport {
    pub status: NodeSyncStatus,
    /// The epoch of the heaviest validated tipset on the node's main chain.
    pub current_head_epoch: ChainEpoch,
    pub current_head_key: Option<TipsetKey>,
    /// Epoch the network should be at according to the clock.
    pub network_head_epoch: ChainEpoch,
    /// Can be negative if the node clock lags behind block timestamps.
    pub epochs_behind: i64,
    pub active_forks: Vec<ForkSyncInfo>,
    /// Failure of the last head change reconciliation, if it failed.
    pub reconcile_error: Option<String>,
    pub node_start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SyncStatusReport {
    pub fn init() -> Self {
        let now = Utc::now();
        Self {
            status: NodeSyncStatus::default(),
            current_head_epoch: 0,
            current_head_key: None,
            network_head_epoch: 0,
            epochs_behind: 0,
            active_forks: vec![],
            reconcile_error: None,
            node_start_time: now,
            last_updated: now,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.status == NodeSyncStatus::Ready
    }
}

/// Shared, always readable sync status.
#[derive(Debug)]
pub struct StatusReporter {
    report: RwLock<SyncStatusReport>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self {
            report: RwLock::new(SyncStatusReport::init()),
        }
    }
}

impl StatusReporter {
    pub fn report(&self) -> SyncStatusReport {
        self.report.read().clone()
    }

    /// Recomputes the report for the given head. An error marks the node as
    /// failed until the next successful update.
    pub fn update(
        &self,
        head: &Tipset,
        clock: &ChainClock,
        active_forks: Vec<ForkSyncInfo>,
        error: Option<String>,
    ) -> SyncStatusReport {
        let current_head_epoch = head.epoch();
        let network_head_epoch = clock.current_epoch();
        let epochs_behind = network_head_epoch - current_head_epoch;
        trace!(
            "Sync status report: current head epoch: {current_head_epoch}, network head epoch: {network_head_epoch}, epochs behind: {epochs_behind}"
        );
        let status = match error {
            Some(e) => NodeSyncStatus::Error(e),
            None if epochs_behind <= SYNCED_EPOCH_THRESHOLD => NodeSyncStatus::Ready,
            None => NodeSyncStatus::Syncing,
        };
        let mut report = self.report.write();
        *report = SyncStatusReport {
            status,
            current_head_epoch,
            current_head_key: Some(head.key().clone()),
            network_head_epoch,
            epochs_behind,
            active_forks,
            reconcile_error: report.reconcile_error.clone(),
            node_start_time: report.node_start_time,
            last_updated: Utc::now(),
        };
        report.clone()
    }

    /// Records the outcome of the latest head change reconciliation. Kept
    /// across updates until the next reconciliation.
    pub fn set_reconcile_error(&self, error: Option<String>) {
        let mut report = self.report.write();
        report.reconcile_error = error;
        report.last_updated = Utc::now();
    }
}

/// Process-wide "chain synced" gate. Starts closed and opens once.
#[derive(Debug, Clone)]
pub struct SyncedGate {
    tx: watch::Sender<bool>,
}

impl Default for SyncedGate {
    fn default() -> Self {
        Self {
            tx: watch::Sender::new(false),
        }
    }
}

impl SyncedGate {
    /// Opens the gate. Returns `true` only for the call that opened it.
    pub fn open(&self) -> bool {
        self.tx.send_if_modified(|open| !std::mem::replace(open, true))
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close.
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ChainClock, FakeClock};
    use crate::db::MemoryDB;
    use crate::test_utils::{genesis_tipset, tipset_child};
    use std::sync::Arc;

    #[test]
    fn status_follows_the_clock() {
        let db = Arc::new(MemoryDB::default());
        let genesis = Arc::new(genesis_tipset(&db));
        let clock = Arc::new(FakeClock::new(0));
        let chain_clock = ChainClock::new(clock.clone(), 0, 30);
        let reporter = StatusReporter::default();
        assert_eq!(reporter.report().status, NodeSyncStatus::Initializing);

        clock.set(30 * 100);
        let report = reporter.update(&genesis, &chain_clock, vec![], None);
        assert_eq!(report.status, NodeSyncStatus::Syncing);
        assert_eq!(report.epochs_behind, 100);

        let head = tipset_child(&db, &genesis, 95);
        assert!(reporter.update(&head, &chain_clock, vec![], None).is_synced());

        let report = reporter.update(&head, &chain_clock, vec![], Some("boom".into()));
        assert_eq!(report.status.to_string(), "Error: boom");
        assert_eq!(report.current_head_key.as_ref(), Some(head.key()));
    }

    #[test]
    fn reconcile_error_survives_status_updates() {
        let db = Arc::new(MemoryDB::default());
        let genesis = Arc::new(genesis_tipset(&db));
        let chain_clock = ChainClock::new(Arc::new(FakeClock::new(0)), 0, 30);
        let reporter = StatusReporter::default();
        reporter.set_reconcile_error(Some("pool unavailable".into()));
        let report = reporter.update(&genesis, &chain_clock, vec![], None);
        assert_eq!(report.reconcile_error.as_deref(), Some("pool unavailable"));
        reporter.set_reconcile_error(None);
        assert_eq!(reporter.report().reconcile_error, None);
    }

    #[tokio::test]
    async fn gate_opens_exactly_once() {
        let gate = SyncedGate::default();
        assert!(!gate.is_open());
        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait().await }
        });
        assert!(gate.open());
        assert!(!gate.open());
        waiter.await.unwrap();
        assert!(gate.is_open());
    }
}
