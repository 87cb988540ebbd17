// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;
use std::time::Duration;

use crate::blocks::Tipset;
use crate::interpreter::Receipt;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{
    ChainStore, Error, HeadChange,
    message_store::{load_receipts, messages_for_tipset},
};
use crate::db::SettingsStore;

/// A message found on chain, with the tipset that included it.
#[derive(Clone, Debug)]
pub struct MessageLookup {
    pub tipset: Arc<Tipset>,
    pub receipt: Receipt,
}

impl<DB> ChainStore<DB>
where
    DB: Blockstore + SettingsStore,
{
    /// Returns the receipt of `message` if `ts` executed it.
    pub fn receipt_in_tipset(&self, ts: &Tipset, message: &Cid) -> Result<Option<Receipt>, Error> {
        let Some(index) = messages_for_tipset(self.blockstore(), ts)?
            .iter()
            .position(|m| m.cid() == *message)
        else {
            return Ok(None);
        };
        let metadata = self
            .tipset_metadata(ts.key())?
            .ok_or_else(|| Error::NotFound(format!("metadata of tipset {}", ts.key())))?;
        let receipts = load_receipts(self.blockstore(), &metadata.receipts_root)?;
        Ok(receipts.get(index).cloned())
    }

    /// Searches the last `lookback` canonical tipsets for `message`.
    pub fn search_for_message(
        &self,
        message: &Cid,
        lookback: usize,
    ) -> Result<Option<MessageLookup>, Error> {
        for tipset in self.chain(self.heaviest_tipset()).take(lookback) {
            if let Some(receipt) = self.receipt_in_tipset(&tipset, message)? {
                return Ok(Some(MessageLookup { tipset, receipt }));
            }
        }
        Ok(None)
    }

    /// Waits until `message` is included in the canonical chain, looking
    /// `lookback` tipsets into the past first. Returns `None` on timeout.
    pub async fn wait_for_message(
        &self,
        message: Cid,
        lookback: usize,
        timeout: Duration,
    ) -> Result<Option<MessageLookup>, Error> {
        // Subscribe first so no head change slips between the search and the wait.
        let head_changes = self.subscribe_head_changes();
        if let Some(found) = self.search_for_message(&message, lookback)? {
            return Ok(Some(found));
        }

        tokio::time::timeout(timeout, self.follow_head_for_message(head_changes, &message, lookback))
            .await
            .unwrap_or(Ok(None))
    }

    async fn follow_head_for_message(
        &self,
        mut head_changes: tokio::sync::broadcast::Receiver<HeadChange>,
        message: &Cid,
        lookback: usize,
    ) -> Result<Option<MessageLookup>, Error> {
        loop {
            match head_changes.recv().await {
                Ok(HeadChange::Apply(tipset)) => {
                    if let Some(receipt) = self.receipt_in_tipset(&tipset, message)? {
                        return Ok(Some(MessageLookup { tipset, receipt }));
                    }
                }
                Ok(HeadChange::Revert(_)) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("message waiter lagged behind {n} head changes");
                    if let Some(found) = self.search_for_message(message, lookback)? {
                        return Ok(Some(found));
                    }
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}
