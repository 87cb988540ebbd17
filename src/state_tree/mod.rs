// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Account and power state addressed by a single root CID.

use crate::shim::{address::Address, econ::TokenAmount};
use crate::utils::cid::{get_cbor, put_cbor};
use ahash::HashMap;
use anyhow::Context as _;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use itertools::Itertools as _;

/// Storage power of a miner, in bytes.
pub type StoragePower = u64;

/// State of a single account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ActorState {
    pub balance: TokenAmount,
    /// Number of messages sent by this account that made it on chain.
    pub sequence: u64,
}

impl ActorState {
    pub fn new(balance: TokenAmount, sequence: u64) -> Self {
        Self { balance, sequence }
    }
}

#[derive(Serialize_tuple, Deserialize_tuple)]
struct StateRoot {
    network_name: String,
    actors: Vec<(Address, ActorState)>,
    power: Vec<(Address, StoragePower)>,
}

/// In-memory view of a state root. Changes are only visible to other readers
/// after [`StateTree::flush`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateTree {
    network_name: String,
    actors: HashMap<Address, ActorState>,
    power: HashMap<Address, StoragePower>,
}

impl StateTree {
    pub fn new(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            ..Default::default()
        }
    }

    /// Loads the state tree stored under `root`.
    pub fn load(db: &impl Blockstore, root: &Cid) -> anyhow::Result<Self> {
        let StateRoot {
            network_name,
            actors,
            power,
        } = get_cbor(db, root)?.with_context(|| format!("state root {root} not found"))?;
        Ok(Self {
            network_name,
            actors: actors.into_iter().collect(),
            power: power.into_iter().collect(),
        })
    }

    /// Persists the tree and returns its root. Entries are sorted by address
    /// bytes so equal states always produce equal roots.
    pub fn flush(&self, db: &impl Blockstore) -> anyhow::Result<Cid> {
        let root = StateRoot {
            network_name: self.network_name.clone(),
            actors: self
                .actors
                .iter()
                .map(|(addr, actor)| (*addr, actor.clone()))
                .sorted_by_cached_key(|(addr, _)| addr.to_bytes())
                .collect(),
            power: self
                .power
                .iter()
                .map(|(addr, power)| (*addr, *power))
                .sorted_by_cached_key(|(addr, _)| addr.to_bytes())
                .collect(),
        };
        put_cbor(db, &root)
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn get_actor(&self, addr: &Address) -> Option<&ActorState> {
        self.actors.get(addr)
    }

    pub fn set_actor(&mut self, addr: Address, actor: ActorState) {
        self.actors.insert(addr, actor);
    }

    /// Returns the actor at `addr`, creating an empty account if missing.
    pub fn get_or_create_actor(&mut self, addr: Address) -> &mut ActorState {
        self.actors.entry(addr).or_default()
    }

    pub fn miner_power(&self, addr: &Address) -> StoragePower {
        self.power.get(addr).copied().unwrap_or_default()
    }

    pub fn set_miner_power(&mut self, addr: Address, power: StoragePower) {
        if power == 0 {
            self.power.remove(&addr);
        } else {
            self.power.insert(addr, power);
        }
    }

    pub fn total_power(&self) -> u128 {
        self.power.values().map(|p| u128::from(*p)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDB;

    #[test]
    fn flush_is_independent_of_insertion_order() {
        let db = MemoryDB::default();
        let mut a = StateTree::new("testnet");
        let mut b = StateTree::new("testnet");
        for id in [1u64, 2, 3] {
            a.set_actor(Address::new_id(id), ActorState::new(TokenAmount::from_atto(id), 0));
        }
        for id in [3u64, 1, 2] {
            b.set_actor(Address::new_id(id), ActorState::new(TokenAmount::from_atto(id), 0));
        }
        a.set_miner_power(Address::new_id(1000), 5);
        b.set_miner_power(Address::new_id(1000), 5);
        assert_eq!(a.flush(&db).unwrap(), b.flush(&db).unwrap());
    }

    #[test]
    fn load_restores_flushed_state() {
        let db = MemoryDB::default();
        let mut tree = StateTree::new("testnet");
        tree.set_actor(Address::new_id(7), ActorState::new(TokenAmount::from_whole(3), 4));
        tree.set_miner_power(Address::new_id(1000), 10);
        tree.set_miner_power(Address::new_id(1001), 30);
        let root = tree.flush(&db).unwrap();
        let loaded = StateTree::load(&db, &root).unwrap();
        assert_eq!(loaded, tree);
        assert_eq!(loaded.network_name(), "testnet");
        assert_eq!(loaded.total_power(), 40);
        assert_eq!(loaded.miner_power(&Address::new_id(9)), 0);
    }
}
