// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod bad_block_cache;
mod chain_follower;
pub mod consensus;
pub mod metrics;
pub mod network_context;
mod sync_status;
mod tipset_syncer;

pub use self::{
    bad_block_cache::BadBlockCache,
    chain_follower::chain_follower,
    consensus::collect_errs,
    network_context::{BlockstoreFetcher, Fetcher, OfflineFetcher},
    sync_status::{
        ForkSyncInfo, NodeSyncStatus, SYNCED_EPOCH_THRESHOLD, StatusReporter, SyncStage,
        SyncStatusReport, SyncedGate,
    },
    tipset_syncer::{HeadChangeHandler, SyncConfig, SyncError, SyncOutcome, Syncer},
};
