// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub(in crate::message_pool) mod msg_pool;
pub(in crate::message_pool) mod provider;

use std::sync::Arc;

use crate::message::{Message as _, SignedMessage};
use crate::network::PeerOrigin;
use crate::shim::econ::TokenAmount;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use self::{msg_pool::MessagePool, provider::Provider};
use super::errors::Error;

/// Stateless checks applied to gossiped messages before they reach the pool.
pub fn validate_incoming(msg: &SignedMessage, confirmed: u64, max_nonce_gap: u64) -> Result<(), Error> {
    if msg.value() < TokenAmount::default() {
        return Err(Error::NegativeValue);
    }
    if msg.gas_fee_cap().is_negative() || msg.gas_premium().is_negative() {
        return Err(Error::NegativeGasPrice);
    }
    if msg.sequence() > confirmed.saturating_add(max_nonce_gap) {
        return Err(Error::SequenceTooHigh {
            sequence: msg.sequence(),
            confirmed,
        });
    }
    Ok(())
}

impl<T: Provider> MessagePool<T> {
    /// Admits a message received from the network. Messages too far ahead
    /// of the sender's confirmed nonce are refused.
    pub fn add_remote(&self, msg: SignedMessage) -> Result<(), Error> {
        let head = self.heaviest_tipset();
        let confirmed = self.confirmed_sequence(&msg.from(), &head)?;
        validate_incoming(&msg, confirmed, self.config().max_nonce_gap)?;
        self.add(msg).map(|_| ())
    }
}

/// Feeds gossiped messages into the pool until `shutdown` fires or the
/// channel closes. Rejected messages are logged and dropped.
pub async fn ingest_messages<T: Provider>(
    pool: Arc<MessagePool<T>>,
    messages: flume::Receiver<(PeerOrigin, SignedMessage)>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let (source, msg) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = messages.recv_async() => match received {
                Ok(received) => received,
                Err(_) => break,
            },
        };
        let cid = msg.cid();
        match pool.add_remote(msg) {
            Ok(()) => trace!("Added message {cid} from {source}"),
            Err(e) => debug!("Dropping message {cid} from {source}: {e}"),
        }
    }
    info!("Message ingestion stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDB;
    use crate::key_management::digest::DigestVerifier;
    use crate::message_pool::{ChainStoreProvider, MpoolConfig};
    use crate::test_utils::{TestChain, signed_message};
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, true)]
    #[case(100, 0, true)]
    #[case(101, 0, false)]
    #[case(150, 60, true)]
    fn nonce_gap_is_bounded(#[case] sequence: u64, #[case] confirmed: u64, #[case] ok: bool) {
        let msg = signed_message(100, 200, sequence, 1);
        assert_eq!(validate_incoming(&msg, confirmed, 100).is_ok(), ok);
    }

    #[test]
    fn negative_value_is_rejected() {
        let mut msg = signed_message(100, 200, 0, 1);
        msg.message.value = TokenAmount::from_atto(-1);
        assert_eq!(validate_incoming(&msg, 0, 100), Err(Error::NegativeValue));
    }

    #[rstest]
    #[case(-1, 1)]
    #[case(1, -1)]
    fn negative_gas_price_is_rejected(#[case] fee_cap: i64, #[case] premium: i64) {
        let mut msg = signed_message(100, 200, 0, 1);
        msg.message.gas_fee_cap = TokenAmount::from_atto(fee_cap);
        msg.message.gas_premium = TokenAmount::from_atto(premium);
        assert_eq!(validate_incoming(&msg, 0, 100), Err(Error::NegativeGasPrice));
    }

    fn pool(chain: &TestChain) -> Arc<MessagePool<ChainStoreProvider<MemoryDB>>> {
        Arc::new(MessagePool::new(
            Arc::new(ChainStoreProvider::new(chain.cs.clone())),
            Arc::new(DigestVerifier),
            MpoolConfig::default(),
        ))
    }

    #[tokio::test]
    async fn ingestion_admits_valid_messages_until_closed() {
        let chain = TestChain::new();
        let pool = pool(&chain);
        let (tx, rx) = flume::unbounded();
        tx.send((PeerOrigin::from("peer".to_string()), chain.message(0, 1)))
            .unwrap();
        tx.send((PeerOrigin::from("peer".to_string()), chain.message(500, 1)))
            .unwrap();
        drop(tx);
        ingest_messages(pool.clone(), rx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(pool.pending(), vec![chain.message(0, 1)]);
    }

    #[tokio::test]
    async fn ingestion_stops_on_shutdown() {
        let chain = TestChain::new();
        let (_tx, rx) = flume::unbounded();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        ingest_messages(pool(&chain), rx, shutdown).await.unwrap();
    }
}
