// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::{CachingBlockHeader, RawBlockHeader, Ticket, TipsetKey, VRFProof};
use crate::chain::persist_messages;
use crate::interpreter::Receipt;
use crate::shim::{address::Address, econ::TokenAmount};
use crate::state_tree::{ActorState, StateTree, StoragePower};
use crate::utils::cid::put_cbor;
use fvm_ipld_blockstore::Blockstore;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Initial balance of an account, in whole tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub id: u64,
    pub balance: u64,
}

/// Initial power of a miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisMiner {
    pub id: u64,
    pub power: StoragePower,
}

/// Everything needed to build the genesis block deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Recorded in the genesis state, selects the protocol rule table.
    pub network_name: String,
    pub accounts: Vec<GenesisAccount>,
    pub miners: Vec<GenesisMiner>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            timestamp: 0,
            network_name: "devnet".into(),
            accounts: vec![],
            miners: vec![GenesisMiner { id: 1000, power: 1 }],
        }
    }
}

/// Builds the genesis block and writes its state into `db`. The same
/// configuration always yields the same genesis CID.
pub fn make_genesis<DB>(db: &DB, config: &GenesisConfig) -> anyhow::Result<CachingBlockHeader>
where
    DB: Blockstore,
{
    let mut state = StateTree::new(config.network_name.clone());
    for account in &config.accounts {
        state.set_actor(
            Address::new_id(account.id),
            ActorState::new(TokenAmount::from_whole(account.balance), 0),
        );
    }
    for miner in &config.miners {
        state.set_miner_power(Address::new_id(miner.id), miner.power);
    }
    let state_root = state.flush(db)?;
    let messages = persist_messages(db, &[])?;
    let message_receipts = put_cbor(db, &Vec::<Receipt>::new())?;

    let genesis = CachingBlockHeader::new(RawBlockHeader {
        miner_address: Address::new_id(0),
        ticket: Some(Ticket::new(VRFProof::new(
            config.network_name.as_bytes().to_vec(),
        ))),
        election_proof: None,
        parents: TipsetKey::default(),
        weight: BigInt::from(0),
        epoch: 0,
        state_root,
        message_receipts,
        messages,
        timestamp: config.timestamp,
        signature: None,
    });
    genesis.persist(db)?;
    info!("Initialized genesis: {}", genesis.cid());
    Ok(genesis)
}

/// Reads the network name from the genesis state.
pub fn get_network_name_from_genesis<DB>(
    genesis_header: &CachingBlockHeader,
    db: &DB,
) -> anyhow::Result<String>
where
    DB: Blockstore,
{
    let state = StateTree::load(db, &genesis_header.state_root)
        .map_err(|e| anyhow::anyhow!("Failed to retrieve network name from genesis: {e}"))?;
    Ok(state.network_name().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDB;

    fn config() -> GenesisConfig {
        GenesisConfig {
            timestamp: 1000,
            network_name: "testnet".into(),
            accounts: vec![GenesisAccount {
                id: 100,
                balance: 1,
            }],
            miners: vec![GenesisMiner { id: 1000, power: 10 }],
        }
    }

    #[test]
    fn genesis_is_deterministic() {
        let a = make_genesis(&MemoryDB::default(), &config()).unwrap();
        let b = make_genesis(&MemoryDB::default(), &config()).unwrap();
        assert_eq!(a.cid(), b.cid());
        assert_eq!(a.epoch, 0);
        assert!(a.parents.is_empty());
        assert!(a.ticket.is_some());
    }

    #[test]
    fn network_name_is_read_from_state() {
        let db = MemoryDB::default();
        let genesis = make_genesis(&db, &config()).unwrap();
        assert_eq!(get_network_name_from_genesis(&genesis, &db).unwrap(), "testnet");
    }

    #[test]
    fn genesis_config_from_toml() {
        let config: GenesisConfig = toml::from_str(
            r#"
            timestamp = 5
            network_name = "calibnet"
            accounts = [{ id = 100, balance = 1000 }]
            "#,
        )
        .unwrap();
        assert_eq!(config.accounts[0].balance, 1000);
        assert_eq!(config.miners, GenesisConfig::default().miners);
    }
}
