// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

// Contains the implementation of Message Pool component.
// The Message Pool is the component of the node that handles pending messages
// for inclusion in the chain. Messages are added either directly for locally
// published messages or through pubsub propagation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::blocks::Tipset;
use crate::chain::HeadChanges;
use crate::chain_sync::HeadChangeHandler;
use crate::key_management::SignatureVerifier;
use crate::message::{Message as _, SignedMessage};
use super::provider::Provider;
use crate::message_pool::{config::MpoolConfig, errors::Error, metrics};
use crate::shim::{address::Address, clock::ChainEpoch};
use ahash::{HashMap, HashSet, HashSetExt as _};
use cid::Cid;
use itertools::Itertools as _;
use parking_lot::RwLock;
use tracing::{debug, trace};

#[derive(Clone, Debug)]
struct PendingMessage {
    message: SignedMessage,
    /// Head epoch when the message was admitted
    added_at: ChainEpoch,
}

/// Pending messages of one sender, ordered by sequence.
#[derive(Clone, Default, Debug)]
pub struct MsgSet {
    msgs: BTreeMap<u64, PendingMessage>,
}

impl MsgSet {
    fn len(&self) -> usize {
        self.msgs.len()
    }

    fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }
}

/// This contains all necessary information needed for the message pool.
/// Keeps track of pending messages, keyed by sender and nonce-ordered.
pub struct MessagePool<T> {
    /// The underlying provider
    api: Arc<T>,
    verifier: Arc<dyn SignatureVerifier>,
    /// A map of pending messages where the key is the address. The write
    /// lock serializes every pool mutation.
    pending: RwLock<HashMap<Address, MsgSet>>,
    /// Configurable parameters of the message pool
    config: MpoolConfig,
}

impl<T> MessagePool<T>
where
    T: Provider,
{
    pub fn new(api: Arc<T>, verifier: Arc<dyn SignatureVerifier>, config: MpoolConfig) -> Self {
        Self {
            api,
            verifier,
            pending: RwLock::default(),
            config,
        }
    }

    pub fn config(&self) -> &MpoolConfig {
        &self.config
    }

    pub fn heaviest_tipset(&self) -> Arc<Tipset> {
        self.api.heaviest_tipset()
    }

    /// Sequence of the next message of `addr` to be executed on chain.
    pub fn confirmed_sequence(&self, addr: &Address, ts: &Tipset) -> Result<u64, Error> {
        Ok(self
            .api
            .get_actor_after(addr, ts)?
            .map(|actor| actor.sequence)
            .unwrap_or_default())
    }

    /// Admits a message to the pool. Adding a message that is already
    /// pending is a no-op. The pool is left unchanged on error.
    pub fn add(&self, msg: SignedMessage) -> Result<Cid, Error> {
        self.verifier
            .verify_message(&msg)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let head = self.api.heaviest_tipset();
        let confirmed = self.confirmed_sequence(&msg.from(), &head)?;
        if msg.sequence() < confirmed {
            return Err(Error::SequenceTooLow {
                sequence: msg.sequence(),
                confirmed,
            });
        }
        let cid = msg.cid();
        let mut pending = self.pending.write();
        if let Some(existing) = pending
            .get(&msg.from())
            .and_then(|set| set.msgs.get(&msg.sequence()))
        {
            if existing.message.cid() == cid {
                trace!("Message {cid} already pending");
                return Ok(cid);
            }
            return Err(Error::NonceConflict {
                from: msg.from(),
                sequence: msg.sequence(),
            });
        }
        if pending.values().map(MsgSet::len).sum::<usize>() >= self.config.max_pool_size {
            return Err(Error::PoolFull);
        }
        pending.entry(msg.from()).or_default().msgs.insert(
            msg.sequence(),
            PendingMessage {
                message: msg,
                added_at: head.epoch(),
            },
        );
        metrics::MPOOL_MESSAGE_TOTAL.inc();
        Ok(cid)
    }

    /// All pending messages, grouped by sender and nonce-ordered.
    pub fn pending(&self) -> Vec<SignedMessage> {
        self.pending
            .read()
            .iter()
            .sorted_by_cached_key(|(addr, _)| addr.to_bytes())
            .flat_map(|(_, set)| set.msgs.values().map(|p| p.message.clone()))
            .collect()
    }

    /// Pending messages of `addr`, nonce-ordered.
    pub fn pending_for(&self, addr: &Address) -> Vec<SignedMessage> {
        self.pending
            .read()
            .get(addr)
            .map(|set| set.msgs.values().map(|p| p.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, cid: &Cid) -> Option<SignedMessage> {
        self.pending
            .read()
            .values()
            .flat_map(|set| set.msgs.values())
            .find(|p| &p.message.cid() == cid)
            .map(|p| p.message.clone())
    }

    pub fn size(&self) -> usize {
        self.pending.read().values().map(MsgSet::len).sum()
    }

    /// Brings the pool in line with a new head: messages of reverted tipsets
    /// are re-admitted, mined messages are removed, messages whose sequence
    /// is now below the confirmed one and messages older than
    /// `inbox_max_age_tipsets` are purged.
    pub fn head_change(&self, changes: &HeadChanges) -> Result<(), Error> {
        let head = self.api.heaviest_tipset();

        let mut reverted = Vec::new();
        for ts in &changes.reverted {
            reverted.extend(self.api.messages_for_tipset(ts)?);
        }
        let mut mined = HashSet::new();
        for ts in &changes.applied {
            for msg in self.api.messages_for_tipset(ts)? {
                mined.insert((msg.from(), msg.sequence()));
            }
        }

        let mut pending = self.pending.write();
        for msg in reverted {
            if mined.contains(&(msg.from(), msg.sequence())) {
                continue;
            }
            let set = pending.entry(msg.from()).or_default();
            set.msgs
                .entry(msg.sequence())
                .or_insert_with(|| PendingMessage {
                    message: msg,
                    added_at: head.epoch(),
                });
        }

        let min_epoch = head.epoch() - self.config.inbox_max_age_tipsets;
        let senders = pending.keys().copied().collect_vec();
        for addr in senders {
            let confirmed = self.confirmed_sequence(&addr, &head)?;
            if let Some(set) = pending.get_mut(&addr) {
                set.msgs.retain(|sequence, p| {
                    let keep = *sequence >= confirmed
                        && !mined.contains(&(addr, *sequence))
                        && p.added_at >= min_epoch;
                    if !keep {
                        debug!("Removing message {} from the pool", p.message.cid());
                    }
                    keep
                });
                if set.is_empty() {
                    pending.remove(&addr);
                }
            }
        }
        metrics::MPOOL_MESSAGE_TOTAL.set(pending.values().map(MsgSet::len).sum::<usize>() as i64);
        Ok(())
    }
}

impl<T: Provider> HeadChangeHandler for MessagePool<T> {
    fn handle_head_change(&self, changes: &HeadChanges) -> anyhow::Result<()> {
        Ok(self.head_change(changes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_pool::ChainStoreProvider;
    use crate::test_utils::{MockVerifier, TestChain, signed_message};
    use pretty_assertions::assert_eq;

    fn pool(chain: &TestChain) -> MessagePool<ChainStoreProvider<crate::db::MemoryDB>> {
        MessagePool::new(
            Arc::new(ChainStoreProvider::new(chain.cs.clone())),
            Arc::new(crate::key_management::digest::DigestVerifier),
            MpoolConfig::default(),
        )
    }

    #[test]
    fn admission_is_idempotent() {
        let chain = TestChain::new();
        let pool = pool(&chain);
        let msg = chain.message(0, 10);
        let cid = pool.add(msg.clone()).unwrap();
        assert_eq!(pool.add(msg.clone()).unwrap(), cid);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.get(&cid), Some(msg));
    }

    #[test]
    fn conflicting_nonce_is_rejected() {
        let chain = TestChain::new();
        let pool = pool(&chain);
        pool.add(chain.message(0, 10)).unwrap();
        assert!(matches!(
            pool.add(chain.message(0, 11)),
            Err(Error::NonceConflict { sequence: 0, .. })
        ));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let chain = TestChain::new();
        let pool = pool(&chain);
        let mut msg = chain.message(0, 10);
        msg.message.value = crate::shim::econ::TokenAmount::from_atto(99);
        assert!(matches!(pool.add(msg), Err(Error::InvalidSignature(_))));
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn stale_nonce_is_rejected_and_pool_unchanged() {
        let chain = TestChain::new();
        let mut tip = chain.genesis();
        for nonce in 0..5 {
            tip = chain.extend_from(&tip, &[1000], nonce as i64 + 1, vec![chain.message(nonce, 1)]);
        }
        chain.set_head(&tip);
        let pool = pool(&chain);
        pool.add(chain.message(5, 1)).unwrap();
        let before = pool.pending();
        assert_eq!(
            pool.add(chain.message(3, 1)),
            Err(Error::SequenceTooLow {
                sequence: 3,
                confirmed: 5
            })
        );
        assert_eq!(pool.pending(), before);
    }

    #[test]
    fn full_pool_refuses_messages() {
        let chain = TestChain::new();
        let pool = MessagePool::new(
            Arc::new(ChainStoreProvider::new(chain.cs.clone())),
            Arc::new(crate::key_management::digest::DigestVerifier),
            MpoolConfig {
                max_pool_size: 1,
                ..Default::default()
            },
        );
        pool.add(chain.message(0, 1)).unwrap();
        assert_eq!(pool.add(chain.message(1, 1)), Err(Error::PoolFull));
    }

    #[test]
    fn mined_messages_leave_and_reverted_come_back() {
        let chain = TestChain::new();
        let pool = pool(&chain);
        let m0 = chain.message(0, 1);
        let m1 = chain.message(1, 1);
        pool.add(m0.clone()).unwrap();
        pool.add(m1.clone()).unwrap();

        let genesis = chain.genesis();
        let mined = chain.extend_from(&genesis, &[1000], 1, vec![m0.clone()]);
        let changes = chain.set_head(&mined);
        pool.head_change(&changes).unwrap();
        assert_eq!(pool.pending(), vec![m1.clone()]);

        // A heavier fork without m0 reverts it.
        let fork = chain.extend_from(&genesis, &[1000, 1001], 1, vec![]);
        let changes = chain.set_head(&fork);
        assert_eq!(changes.reverted, vec![mined]);
        pool.head_change(&changes).unwrap();
        assert_eq!(pool.pending(), vec![m0, m1]);
    }

    #[test]
    fn old_messages_are_evicted() {
        let chain = TestChain::new();
        let pool = pool(&chain);
        pool.add(signed_message(101, 200, 0, 1)).unwrap();
        let mut tip = chain.genesis();
        let mut changes = HeadChanges::default();
        for epoch in 1..=7 {
            tip = chain.extend_from(&tip, &[1000], epoch, vec![]);
            changes = chain.set_head(&tip);
        }
        pool.head_change(&changes).unwrap();
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn unavailable_election_verifier_does_not_matter_for_admission() {
        let chain = TestChain::with_verifier(MockVerifier::Unavailable);
        assert!(pool(&chain).add(chain.message(0, 1)).is_ok());
    }
}
