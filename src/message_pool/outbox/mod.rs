// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Locally originated messages, from signing until they are mined.

mod policy;
mod publisher;
mod queue;
mod validator;

pub use self::{
    policy::{OutboxPolicy, OutboxState},
    publisher::{DefaultMessagePublisher, MessagePublisher},
    queue::{MessageQueue, QueuedMessage},
    validator::validate_outbound,
};

use std::sync::Arc;
use std::time::Duration;

use crate::chain::HeadChanges;
use crate::chain_sync::HeadChangeHandler;
use crate::clock::ChainClock;
use crate::key_management::Wallet;
use crate::message::SignedMessage;
use crate::message_pool::{Provider, errors::Error, metrics};
use crate::shim::message::Message;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Outbox<T> {
    api: Arc<T>,
    wallet: Arc<dyn Wallet>,
    publisher: Arc<dyn MessagePublisher>,
    clock: ChainClock,
    policy: OutboxPolicy,
    state: Mutex<OutboxState>,
}

impl<T: Provider> Outbox<T> {
    pub fn new(
        api: Arc<T>,
        wallet: Arc<dyn Wallet>,
        publisher: Arc<dyn MessagePublisher>,
        clock: ChainClock,
        policy: OutboxPolicy,
    ) -> Self {
        Self {
            api,
            wallet,
            publisher,
            clock,
            policy,
            state: Mutex::default(),
        }
    }

    /// Assigns the next nonce of the sender, signs the message, queues it at
    /// the current round and publishes it. The nonce in `message` is
    /// ignored.
    pub async fn send(&self, mut message: Message) -> Result<SignedMessage, Error> {
        let head = self.api.heaviest_tipset();
        let sender = self.api.get_actor_after(&message.from, &head)?;
        let confirmed = sender.as_ref().map(|a| a.sequence).unwrap_or_default();
        validate_outbound(&message, sender.as_ref())?;

        let signed = {
            let mut state = self.state.lock();
            state.queue.prune_confirmed(&message.from, confirmed);
            message.sequence = state
                .queue
                .largest_nonce(&message.from)
                .map_or(Some(confirmed), |n| n.checked_add(1).map(|next| confirmed.max(next)))
                .ok_or_else(|| Error::Other(format!("{} has no nonce left", message.from)))?;
            let payload = SignedMessage::signing_bytes(&message)
                .map_err(|e| Error::Other(e.to_string()))?;
            let signature = self.wallet.sign(&message.from, &payload)?;
            let signed = SignedMessage::new_unchecked(message, signature);
            state
                .queue
                .enqueue(signed.clone(), self.clock.current_epoch())?;
            metrics::OUTBOX_MESSAGE_TOTAL.set(state.queue.size() as i64);
            signed
        };

        // The message stays queued if publishing fails, the sweep drops it
        // once it is too old.
        self.publisher.publish(&signed).await?;
        debug!(
            "Published message {} with nonce {}",
            signed.cid(),
            signed.message.sequence
        );
        Ok(signed)
    }

    /// Applies the expiry policy at the current round.
    pub fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        let expired = self.policy.apply(&mut state, self.clock.current_epoch());
        metrics::OUTBOX_MESSAGE_TOTAL.set(state.queue.size() as i64);
        expired.len()
    }

    /// Queued messages, grouped by sender and nonce-ordered.
    pub fn queued(&self) -> Vec<QueuedMessage> {
        self.state.lock().queue.list()
    }

    pub fn head_change(&self, changes: &HeadChanges) -> Result<(), Error> {
        let mut reverted = vec![];
        for ts in &changes.reverted {
            reverted.extend(self.api.messages_for_tipset(ts)?);
        }
        let mut applied = vec![];
        for ts in &changes.applied {
            applied.extend(self.api.messages_for_tipset(ts)?);
        }
        let mut state = self.state.lock();
        self.policy.on_head_change(
            &mut state,
            &reverted,
            &applied,
            self.clock.current_epoch(),
        );
        metrics::OUTBOX_MESSAGE_TOTAL.set(state.queue.size() as i64);
        Ok(())
    }

    /// Sweeps the queue every `interval` until `shutdown` fires.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = self.sweep();
                    if expired > 0 {
                        warn!("Outbox sweep expired {expired} messages");
                    }
                }
            }
        }
        info!("Outbox sweeper stopped");
        Ok(())
    }
}

impl<T: Provider> HeadChangeHandler for Outbox<T> {
    fn handle_head_change(&self, changes: &HeadChanges) -> anyhow::Result<()> {
        Ok(self.head_change(changes)?)
    }
}
