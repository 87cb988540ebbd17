// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::blocks::TipsetKey;
use crate::chain_sync::{SyncError, SyncOutcome, Syncer};
use crate::db::SettingsStore;
use crate::network::ChainInfo;
use fvm_ipld_blockstore::Blockstore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumes head announcements and runs a sync pipeline for each of them.
/// Returns when the announcement channel closes or on shutdown, after the
/// running pipelines wound down.
pub async fn chain_follower<DB>(
    syncer: Arc<Syncer<DB>>,
    announcements: flume::Receiver<ChainInfo>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    DB: Blockstore + SettingsStore + Send + Sync + 'static,
{
    let mut pipelines: JoinSet<PipelineResult> = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Chain follower shutting down");
                break;
            }
            announcement = announcements.recv_async() => match announcement {
                Ok(info) => {
                    debug!("Head {} (epoch {}) announced by {}", info.head, info.epoch, info.source);
                    let syncer = syncer.clone();
                    pipelines.spawn(async move {
                        let key = info.head.clone();
                        let start = Instant::now();
                        let result = syncer.sync(info).await;
                        (key, start.elapsed(), result)
                    });
                }
                // announcement channel is closed, shutdown gracefully
                Err(_) => break,
            },
            Some(done) = pipelines.join_next(), if !pipelines.is_empty() => log_pipeline(done),
        }
    }
    while let Some(done) = pipelines.join_next().await {
        log_pipeline(done);
    }
    Ok(())
}

type PipelineResult = (TipsetKey, Duration, Result<SyncOutcome, SyncError>);

fn log_pipeline(done: Result<PipelineResult, tokio::task::JoinError>) {
    match done {
        Ok((key, took, Ok(SyncOutcome::Adopted(changes)))) => {
            info!(
                "Adopted {key} in {}: {} tipsets applied, {} reverted",
                humantime::format_duration(Duration::from_millis(took.as_millis() as u64)),
                changes.applied.len(),
                changes.reverted.len()
            );
        }
        Ok((key, _, Ok(outcome))) => debug!("Sync of {key}: {outcome:?}"),
        // Already reported by the syncer.
        Ok((_, _, Err(_))) => {}
        Err(e) => warn!("Sync pipeline panicked: {e}"),
    }
}
