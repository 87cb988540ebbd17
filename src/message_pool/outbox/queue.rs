// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::VecDeque;

use crate::message::{Message as _, SignedMessage};
use crate::message_pool::errors::Error;
use crate::shim::{address::Address, clock::ChainEpoch};
use ahash::HashMap;
use itertools::Itertools as _;

/// A locally originated message waiting to be mined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message: SignedMessage,
    /// Round in which the message was queued
    pub round: ChainEpoch,
    /// Times the message was put back after a reorg
    pub retries: u32,
}

impl QueuedMessage {
    pub fn new(message: SignedMessage, round: ChainEpoch) -> Self {
        Self {
            message,
            round,
            retries: 0,
        }
    }
}

/// Per-sender lists of queued messages. Nonces within a list are contiguous
/// and ascending.
#[derive(Clone, Debug, Default)]
pub struct MessageQueue {
    queues: HashMap<Address, VecDeque<QueuedMessage>>,
}

impl MessageQueue {
    /// Appends a message to the sender's list. Its nonce must follow the
    /// last queued one.
    pub fn enqueue(&mut self, message: SignedMessage, round: ChainEpoch) -> Result<(), Error> {
        let list = self.queues.entry(message.from()).or_default();
        if let Some(last) = list.back() {
            let expected = last.message.sequence().checked_add(1);
            if expected != Some(message.sequence()) {
                return Err(Error::NonContiguousNonce {
                    expected: expected.unwrap_or(u64::MAX),
                    got: message.sequence(),
                });
            }
        }
        list.push_back(QueuedMessage::new(message, round));
        Ok(())
    }

    /// Puts a message back in front of the sender's list. Messages already
    /// queued are skipped.
    pub fn requeue(&mut self, entry: QueuedMessage) -> Result<(), Error> {
        let list = self.queues.entry(entry.message.from()).or_default();
        if list.iter().any(|q| q.message == entry.message) {
            return Ok(());
        }
        if let Some(front) = list.front()
            && front.message.sequence().checked_sub(1) != Some(entry.message.sequence())
        {
            return Err(Error::NonContiguousNonce {
                expected: front.message.sequence().saturating_sub(1),
                got: entry.message.sequence(),
            });
        }
        list.push_front(QueuedMessage {
            retries: entry.retries + 1,
            ..entry
        });
        Ok(())
    }

    /// Removes the front message of `from` if its nonce is `sequence`.
    pub fn remove_next(&mut self, from: &Address, sequence: u64) -> Option<QueuedMessage> {
        let list = self.queues.get_mut(from)?;
        if list.front()?.message.sequence() != sequence {
            return None;
        }
        let removed = list.pop_front();
        if list.is_empty() {
            self.queues.remove(from);
        }
        removed
    }

    /// Drops messages of `from` with a nonce below `confirmed`.
    pub fn prune_confirmed(&mut self, from: &Address, confirmed: u64) -> Vec<QueuedMessage> {
        self.prune_while(from, |sequence| sequence < confirmed)
    }

    /// Drops messages of `from` up to and including nonce `mined`.
    pub fn prune_through(&mut self, from: &Address, mined: u64) -> Vec<QueuedMessage> {
        self.prune_while(from, |sequence| sequence <= mined)
    }

    fn prune_while(&mut self, from: &Address, pred: impl Fn(u64) -> bool) -> Vec<QueuedMessage> {
        let Some(list) = self.queues.get_mut(from) else {
            return vec![];
        };
        let mut pruned = vec![];
        while list.front().is_some_and(|q| pred(q.message.sequence())) {
            pruned.extend(list.pop_front());
        }
        if list.is_empty() {
            self.queues.remove(from);
        }
        pruned
    }

    /// Drops the whole list of every sender whose oldest message was queued
    /// before `round`. Later nonces cannot be mined without it.
    pub fn expire_before(&mut self, round: ChainEpoch) -> Vec<QueuedMessage> {
        let expired = self
            .queues
            .iter()
            .filter(|(_, list)| list.front().is_some_and(|q| q.round < round))
            .map(|(addr, _)| *addr)
            .collect_vec();
        expired
            .into_iter()
            .filter_map(|addr| self.queues.remove(&addr))
            .flatten()
            .collect()
    }

    pub fn largest_nonce(&self, from: &Address) -> Option<u64> {
        self.queues
            .get(from)
            .and_then(|list| list.back())
            .map(|q| q.message.sequence())
    }

    pub fn senders(&self) -> impl Iterator<Item = &Address> {
        self.queues.keys()
    }

    /// Queued messages, grouped by sender and nonce-ordered.
    pub fn list(&self) -> Vec<QueuedMessage> {
        self.queues
            .iter()
            .sorted_by_cached_key(|(addr, _)| addr.to_bytes())
            .flat_map(|(_, list)| list.iter().cloned())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::signed_message;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    fn sequences(queue: &MessageQueue) -> Vec<u64> {
        queue.list().iter().map(|q| q.message.sequence()).collect()
    }

    #[test]
    fn enqueue_requires_contiguous_nonces() {
        let mut queue = MessageQueue::default();
        queue.enqueue(signed_message(100, 200, 3, 1), 1).unwrap();
        queue.enqueue(signed_message(100, 200, 4, 1), 1).unwrap();
        assert_eq!(
            queue.enqueue(signed_message(100, 200, 6, 1), 1),
            Err(Error::NonContiguousNonce {
                expected: 5,
                got: 6
            })
        );
        assert_eq!(queue.largest_nonce(&Address::new_id(100)), Some(4));
        assert_eq!(queue.size(), 2);
    }

    #[test]
    fn requeue_prepends_and_skips_duplicates() {
        let mut queue = MessageQueue::default();
        queue.enqueue(signed_message(100, 200, 2, 1), 5).unwrap();
        let reorged = QueuedMessage::new(signed_message(100, 200, 1, 1), 3);
        queue.requeue(reorged.clone()).unwrap();
        queue.requeue(reorged).unwrap();
        assert!(
            queue
                .requeue(QueuedMessage::new(signed_message(100, 200, 5, 1), 3))
                .is_err()
        );
        assert_eq!(sequences(&queue), vec![1, 2]);
        assert_eq!(queue.list()[0].retries, 1);
    }

    #[test]
    fn remove_next_only_takes_the_front() {
        let mut queue = MessageQueue::default();
        let from = Address::new_id(100);
        queue.enqueue(signed_message(100, 200, 0, 1), 1).unwrap();
        queue.enqueue(signed_message(100, 200, 1, 1), 1).unwrap();
        assert!(queue.remove_next(&from, 1).is_none());
        assert!(queue.remove_next(&from, 0).is_some());
        assert!(queue.remove_next(&from, 1).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn expiry_drops_whole_sender_lists() {
        let mut queue = MessageQueue::default();
        queue.enqueue(signed_message(100, 200, 0, 1), 1).unwrap();
        queue.enqueue(signed_message(100, 200, 1, 1), 9).unwrap();
        queue.enqueue(signed_message(101, 200, 0, 1), 8).unwrap();
        let expired = queue.expire_before(5);
        assert_eq!(expired.len(), 2);
        assert_eq!(
            queue.list(),
            vec![QueuedMessage::new(signed_message(101, 200, 0, 1), 8)]
        );
    }

    #[test]
    fn prune_confirmed_drops_mined_prefix() {
        let mut queue = MessageQueue::default();
        let from = Address::new_id(100);
        for nonce in 0..4 {
            queue.enqueue(signed_message(100, 200, nonce, 1), 1).unwrap();
        }
        assert_eq!(queue.prune_confirmed(&from, 2).len(), 2);
        assert_eq!(sequences(&queue), vec![2, 3]);
    }

    #[test]
    fn nothing_follows_the_last_nonce() {
        let mut queue = MessageQueue::default();
        queue
            .enqueue(signed_message(100, 200, u64::MAX, 1), 1)
            .unwrap();
        assert_eq!(
            queue.enqueue(signed_message(100, 200, 0, 1), 1),
            Err(Error::NonContiguousNonce {
                expected: u64::MAX,
                got: 0
            })
        );
        assert_eq!(queue.prune_through(&Address::new_id(100), u64::MAX).len(), 1);
        assert!(queue.is_empty());
    }

    #[quickcheck]
    fn queued_nonces_stay_contiguous(ops: Vec<(bool, u8)>) -> bool {
        let mut queue = MessageQueue::default();
        let from = Address::new_id(100);
        for (push, nonce) in ops {
            let nonce = u64::from(nonce % 16);
            if push {
                let _ = queue.enqueue(signed_message(100, 200, nonce, 1), 0);
            } else {
                queue.remove_next(&from, nonce);
            }
        }
        sequences(&queue).windows(2).all(|w| w[1] == w[0] + 1)
    }
}
