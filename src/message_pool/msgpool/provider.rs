// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::Tipset;
use crate::chain::{ChainStore, messages_for_tipset};
use crate::db::SettingsStore;
use crate::message::SignedMessage;
use crate::message_pool::errors::Error;
use crate::shim::address::Address;
use crate::state_tree::{ActorState, StateTree};
use fvm_ipld_blockstore::Blockstore;

/// Provider Trait. This trait will be used by the message pool and the
/// outbox to interact with some medium in order to do the operations that
/// are listed below that are required for them.
pub trait Provider: Send + Sync + 'static {
    /// Get the heaviest Tipset in the provider
    fn heaviest_tipset(&self) -> Arc<Tipset>;
    /// Get the actor state after `ts` was executed. `None` if the actor does
    /// not exist.
    fn get_actor_after(&self, addr: &Address, ts: &Tipset) -> Result<Option<ActorState>, Error>;
    /// Return all messages for a tipset, deduplicated, in execution order
    fn messages_for_tipset(&self, ts: &Tipset) -> Result<Vec<SignedMessage>, Error>;
}

/// This is the default Provider implementation, backed by the chain store.
pub struct ChainStoreProvider<DB> {
    cs: Arc<ChainStore<DB>>,
}

impl<DB> ChainStoreProvider<DB> {
    pub fn new(cs: Arc<ChainStore<DB>>) -> Self {
        Self { cs }
    }
}

impl<DB> Provider for ChainStoreProvider<DB>
where
    DB: Blockstore + SettingsStore + Send + Sync + 'static,
{
    fn heaviest_tipset(&self) -> Arc<Tipset> {
        self.cs.heaviest_tipset()
    }

    fn get_actor_after(&self, addr: &Address, ts: &Tipset) -> Result<Option<ActorState>, Error> {
        let metadata = self
            .cs
            .tipset_metadata(ts.key())?
            .ok_or_else(|| Error::Other(format!("tipset {} is not validated", ts.key())))?;
        let state = StateTree::load(self.cs.blockstore(), &metadata.state_root)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(state.get_actor(addr).cloned())
    }

    fn messages_for_tipset(&self, ts: &Tipset) -> Result<Vec<SignedMessage>, Error> {
        Ok(messages_for_tipset(self.cs.blockstore(), ts)?)
    }
}
