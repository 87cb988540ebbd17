// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Capabilities the node needs from the peer-to-peer layer. The transport
//! itself is not part of this crate: announcements and gossiped messages
//! arrive on channels, outbound gossip goes through a [`PubsubPublisher`].

use crate::blocks::TipsetKey;
use crate::chain::Weight;
use crate::message::SignedMessage;
use crate::shim::clock::ChainEpoch;
use async_trait::async_trait;
use tracing::debug;

/// Block gossip topic prefix. The network name is appended.
pub const PUBSUB_BLOCK_STR: &str = "/fil/blocks";
/// Message gossip topic prefix. The network name is appended.
pub const PUBSUB_MSG_STR: &str = "/fil/msgs";

pub fn block_topic(network_name: &str) -> String {
    format!("{PUBSUB_BLOCK_STR}/{network_name}")
}

pub fn message_topic(network_name: &str) -> String {
    format!("{PUBSUB_MSG_STR}/{network_name}")
}

/// Opaque identifier of the peer a piece of data came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::Display, derive_more::From)]
pub struct PeerOrigin(String);

impl PeerOrigin {
    /// Origin of data produced by this node.
    pub fn local() -> Self {
        Self("local".into())
    }
}

/// A chain head announced by a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub source: PeerOrigin,
    pub head: TipsetKey,
    pub epoch: ChainEpoch,
    pub weight: Weight,
}

/// Inbound events from the peer-to-peer layer.
#[derive(Clone, Debug)]
pub enum NetworkEvent {
    HeadAnnounced(ChainInfo),
    MessageReceived {
        source: PeerOrigin,
        message: SignedMessage,
    },
}

#[async_trait]
pub trait PubsubPublisher: Send + Sync {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<()>;
}

/// Publisher of a node running without network access. Nothing leaves the
/// process.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflinePublisher;

#[async_trait]
impl PubsubPublisher for OfflinePublisher {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<()> {
        debug!("offline: dropping {} bytes for {topic}", data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_named_after_the_network() {
        assert_eq!(block_topic("testnetnet"), "/fil/blocks/testnetnet");
        assert_eq!(message_topic("calibrationnet"), "/fil/msgs/calibrationnet");
    }

    #[tokio::test]
    async fn offline_publisher_accepts_everything() {
        OfflinePublisher
            .publish(&message_topic("devnet"), vec![1, 2, 3])
            .await
            .unwrap();
    }
}
