// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod context;
pub mod main;

use std::sync::Arc;
use std::time::Duration;

use crate::chain_sync::chain_follower;
use crate::cli_shared::cli::{CliOpts, Config};
use crate::db::SettingsStore;
use crate::message::SignedMessage;
use crate::message_pool::ingest_messages;
use crate::network::{ChainInfo, NetworkEvent, PeerOrigin};
use fvm_ipld_blockstore::Blockstore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use self::context::{Node, NodeBuilder};

/// Runs the node's background services until `events` closes or the node is
/// shut down: the event router, the chain follower, message ingestion and
/// the outbox sweeper.
pub async fn run_node<DB>(
    node: Arc<Node<DB>>,
    events: flume::Receiver<NetworkEvent>,
) -> anyhow::Result<()>
where
    DB: Blockstore + SettingsStore + Send + Sync + 'static,
{
    let (announce_tx, announce_rx) = flume::unbounded();
    let (message_tx, message_rx) = flume::unbounded();
    let shutdown = node.shutdown.clone();

    let mut services = JoinSet::new();
    services.spawn(route_events(events, announce_tx, message_tx, shutdown.clone()));
    services.spawn(chain_follower(
        node.syncer.clone(),
        announce_rx,
        shutdown.clone(),
    ));
    services.spawn(ingest_messages(
        node.mpool.clone(),
        message_rx,
        shutdown.clone(),
    ));
    services.spawn(node.outbox.clone().run_sweeper(
        node.outbox_config.sweep_interval.max(Duration::from_secs(1)),
        shutdown.clone(),
    ));

    let mut result = Ok(());
    while let Some(done) = services.join_next().await {
        match done {
            // Router exit closes the follower and ingestion channels, the
            // sweeper only stops on shutdown.
            Ok(Ok(())) => {
                if services.len() == 1 {
                    shutdown.cancel();
                }
            }
            Ok(Err(e)) => {
                warn!("Service failed: {e:#}");
                shutdown.cancel();
                result = Err(e);
            }
            Err(e) => {
                shutdown.cancel();
                result = Err(e.into());
            }
        }
    }
    result
}

async fn route_events(
    events: flume::Receiver<NetworkEvent>,
    announcements: flume::Sender<ChainInfo>,
    messages: flume::Sender<(PeerOrigin, SignedMessage)>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv_async() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        let delivered = match event {
            NetworkEvent::HeadAnnounced(info) => announcements.send_async(info).await.is_ok(),
            NetworkEvent::MessageReceived { source, message } => {
                messages.send_async((source, message)).await.is_ok()
            }
        };
        // Receivers only go away on shutdown.
        if !delivered {
            break;
        }
    }
    Ok(())
}

/// Builds the node from the configuration and runs it until interrupted.
pub(super) async fn start_interruptable(opts: CliOpts, config: Config) -> anyhow::Result<()> {
    let node = Arc::new(NodeBuilder::from_config(&config).build()?);
    info!(
        "Node started on {} (offline: {})",
        node.network_name(),
        opts.offline || config.client.offline
    );

    // No transport is attached, the event channel stays open until the
    // node shuts down.
    let (_events_tx, events_rx) = flume::unbounded();
    let mut services = JoinSet::new();
    services.spawn(run_node(node.clone(), events_rx));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            Ok(())
        }
        done = services.join_next() => match done {
            Some(Ok(result)) => result,
            Some(Err(e)) => Err(e.into()),
            None => Ok(()),
        },
    };
    node.shutdown();
    while services.join_next().await.is_some() {}
    result
}
