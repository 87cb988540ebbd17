// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::shim::address::Address;
use crate::state_tree::{StateTree, StoragePower};
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;

/// Read-only view of the storage power recorded in a state root. A view is
/// always derived from a specific state and never reused across tipsets.
#[derive(Clone, Debug)]
pub struct PowerTableView {
    state: StateTree,
}

impl PowerTableView {
    pub fn load(db: &impl Blockstore, state_root: &Cid) -> anyhow::Result<Self> {
        Ok(Self {
            state: StateTree::load(db, state_root)?,
        })
    }

    pub fn total(&self) -> u128 {
        self.state.total_power()
    }

    pub fn miner(&self, addr: &Address) -> StoragePower {
        self.state.miner_power(addr)
    }

    pub fn has_power(&self, addr: &Address) -> bool {
        self.miner(addr) > 0
    }
}
