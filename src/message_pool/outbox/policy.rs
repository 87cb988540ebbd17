// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::queue::{MessageQueue, QueuedMessage};
use crate::message::{Message as _, SignedMessage};
use crate::shim::clock::ChainEpoch;
use ahash::{HashMap, HashSet};
use cid::Cid;
use itertools::Itertools as _;
use tracing::{debug, warn};

/// Queue contents together with the local messages seen on chain, which are
/// needed to re-queue them when their tipset is reverted.
#[derive(Debug, Default)]
pub struct OutboxState {
    pub queue: MessageQueue,
    pub mined: HashMap<Cid, QueuedMessage>,
}

/// Decides when queued messages are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutboxPolicy {
    pub max_age_rounds: ChainEpoch,
}

impl OutboxPolicy {
    pub fn new(max_age_rounds: ChainEpoch) -> Self {
        Self { max_age_rounds }
    }

    /// Expires messages queued more than `max_age_rounds` before `round`.
    pub fn apply(&self, state: &mut OutboxState, round: ChainEpoch) -> Vec<QueuedMessage> {
        let cutoff = round - self.max_age_rounds;
        // A re-queued message older than the cutoff would expire at once.
        state.mined.retain(|_, q| q.round >= cutoff);
        let expired = state.queue.expire_before(cutoff);
        for q in &expired {
            warn!(
                "Outbox message {} (nonce {}) expired after {} rounds",
                q.message.cid(),
                q.message.sequence(),
                self.max_age_rounds
            );
        }
        expired
    }

    /// Reconciles the queue with the messages of reverted and applied
    /// tipsets, then applies expiry.
    pub fn on_head_change(
        &self,
        state: &mut OutboxState,
        reverted: &[SignedMessage],
        applied: &[SignedMessage],
        round: ChainEpoch,
    ) -> Vec<QueuedMessage> {
        let applied_cids: HashSet<Cid> = applied.iter().map(SignedMessage::cid).collect();
        for msg in applied {
            for q in state.queue.prune_through(&msg.from(), msg.sequence()) {
                debug!("Outbox message {} mined", q.message.cid());
                state.mined.insert(q.message.cid(), q);
            }
        }

        let requeue = reverted
            .iter()
            .map(SignedMessage::cid)
            .filter(|cid| !applied_cids.contains(cid))
            .filter_map(|cid| state.mined.remove(&cid))
            .sorted_by_key(|q| std::cmp::Reverse(q.message.sequence()));
        for q in requeue {
            let cid = q.message.cid();
            match state.queue.requeue(q) {
                Ok(()) => debug!("Re-queued reverted outbox message {cid}"),
                Err(e) => warn!("Could not re-queue outbox message {cid}: {e}"),
            }
        }

        self.apply(state, round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::signed_message;
    use pretty_assertions::assert_eq;

    fn queued(state: &OutboxState) -> Vec<u64> {
        state
            .queue
            .list()
            .iter()
            .map(|q| q.message.sequence())
            .collect()
    }

    #[test]
    fn messages_expire_after_max_age() {
        let policy = OutboxPolicy::new(20);
        let mut state = OutboxState::default();
        state.queue.enqueue(signed_message(100, 200, 0, 1), 10).unwrap();
        assert!(policy.apply(&mut state, 30).is_empty());
        assert_eq!(policy.apply(&mut state, 31).len(), 1);
        assert!(state.queue.is_empty());
    }

    #[test]
    fn mined_messages_leave_and_come_back_on_revert() {
        let policy = OutboxPolicy::new(20);
        let mut state = OutboxState::default();
        let msgs = (0..3)
            .map(|n| signed_message(100, 200, n, 1))
            .collect::<Vec<_>>();
        for m in &msgs {
            state.queue.enqueue(m.clone(), 1).unwrap();
        }

        policy.on_head_change(&mut state, &[], &msgs[..2], 2);
        assert_eq!(queued(&state), vec![2]);

        policy.on_head_change(&mut state, &msgs[..2], &[], 3);
        assert_eq!(queued(&state), vec![0, 1, 2]);
        assert!(state.mined.is_empty());
    }

    #[test]
    fn message_with_the_last_nonce_can_be_mined() {
        let policy = OutboxPolicy::new(20);
        let mut state = OutboxState::default();
        let m = signed_message(100, 200, u64::MAX, 1);
        state.queue.enqueue(m.clone(), 1).unwrap();
        policy.on_head_change(&mut state, &[], &[m.clone()], 2);
        assert!(state.queue.is_empty());
        assert!(state.mined.contains_key(&m.cid()));
    }

    #[test]
    fn messages_mined_again_on_the_new_branch_stay_out() {
        let policy = OutboxPolicy::new(20);
        let mut state = OutboxState::default();
        let m = signed_message(100, 200, 0, 1);
        state.queue.enqueue(m.clone(), 1).unwrap();
        policy.on_head_change(&mut state, &[], &[m.clone()], 2);
        policy.on_head_change(&mut state, &[m.clone()], &[m], 3);
        assert!(state.queue.is_empty());
    }
}
