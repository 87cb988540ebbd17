// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::message::SignedMessage;
use crate::message_pool::{MessagePool, Provider, errors::Error};
use crate::network::PubsubPublisher;
use async_trait::async_trait;
use tracing::debug;

/// Hands signed local messages to the rest of the network.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, msg: &SignedMessage) -> Result<(), Error>;
}

/// Adds the message to the local pool, then gossips it on the message
/// topic unless the node is offline.
pub struct DefaultMessagePublisher<T> {
    pool: Arc<MessagePool<T>>,
    pubsub: Arc<dyn PubsubPublisher>,
    topic: String,
    offline: bool,
}

impl<T> DefaultMessagePublisher<T> {
    pub fn new(
        pool: Arc<MessagePool<T>>,
        pubsub: Arc<dyn PubsubPublisher>,
        topic: String,
        offline: bool,
    ) -> Self {
        Self {
            pool,
            pubsub,
            topic,
            offline,
        }
    }
}

#[async_trait]
impl<T: Provider> MessagePublisher for DefaultMessagePublisher<T> {
    async fn publish(&self, msg: &SignedMessage) -> Result<(), Error> {
        let cid = self.pool.add(msg.clone())?;
        if self.offline {
            debug!("Offline, message {cid} kept local");
            return Ok(());
        }
        let data = fvm_ipld_encoding::to_vec(msg)?;
        self.pubsub
            .publish(&self.topic, data)
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_management::digest::DigestVerifier;
    use crate::message_pool::{ChainStoreProvider, MpoolConfig};
    use crate::network::message_topic;
    use crate::test_utils::{RecordingPublisher, TestChain};
    use pretty_assertions::assert_eq;

    fn publisher(
        chain: &TestChain,
        pubsub: Arc<RecordingPublisher>,
        offline: bool,
    ) -> DefaultMessagePublisher<ChainStoreProvider<crate::db::MemoryDB>> {
        let pool = Arc::new(MessagePool::new(
            Arc::new(ChainStoreProvider::new(chain.cs.clone())),
            Arc::new(DigestVerifier),
            MpoolConfig::default(),
        ));
        DefaultMessagePublisher::new(pool, pubsub, message_topic("devnet"), offline)
    }

    #[tokio::test]
    async fn publishing_adds_locally_and_broadcasts() {
        let chain = TestChain::new();
        let pubsub = Arc::new(RecordingPublisher::default());
        let publisher = publisher(&chain, pubsub.clone(), false);
        let msg = chain.message(0, 1);
        publisher.publish(&msg).await.unwrap();
        assert_eq!(publisher.pool.pending(), vec![msg.clone()]);
        assert_eq!(
            pubsub.published(),
            vec![(
                message_topic("devnet"),
                fvm_ipld_encoding::to_vec(&msg).unwrap()
            )]
        );
    }

    #[tokio::test]
    async fn offline_publishing_stays_local() {
        let chain = TestChain::new();
        let pubsub = Arc::new(RecordingPublisher::default());
        let publisher = publisher(&chain, pubsub.clone(), true);
        publisher.publish(&chain.message(0, 1)).await.unwrap();
        assert_eq!(publisher.pool.size(), 1);
        assert!(pubsub.published().is_empty());
    }
}
