// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::{CachingBlockHeader, Tipset, TipsetKey};
use crate::chain::{Weight, is_heavier};
use crate::db::setting_keys::{
    GENESIS_KEY, HEAD_KEY, HEIGHT_INDEX_PREFIX, TIPSET_METADATA_PREFIX,
};
use crate::db::{SettingsStore, SettingsStoreExt};
use crate::interpreter::Receipt;
use crate::shim::clock::ChainEpoch;
use crate::utils::cid::put_cbor;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use num_bigint::BigInt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, Receiver as Subscriber, Sender as Publisher};
use tracing::{debug, info};

use super::{
    Error,
    index::{ChainIndex, ResolveNullTipset},
    message_store::persist_messages,
};

// A cap on the size of the head change channel
const SINK_CAP: usize = 200;

/// Disambiguate the type to signify that we are expecting a delta and not an actual epoch/height
/// while maintaining the same type.
pub type ChainEpochDelta = ChainEpoch;

/// `Enum` for `pubsub` channel that defines message type variant and data
/// contained in message type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadChange {
    Revert(Arc<Tipset>),
    Apply(Arc<Tipset>),
}

/// What a node learned by executing a tipset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct TipsetMetadata {
    /// State root after applying the tipset's messages.
    pub state_root: Cid,
    /// Root of the receipts of the tipset's messages.
    pub receipts_root: Cid,
    #[serde(with = "fvm_shared4::bigint::bigint_ser")]
    pub weight: Weight,
}

/// Snapshot of the canonical head.
#[derive(Clone, Debug)]
pub struct ChainHead {
    pub tipset: Arc<Tipset>,
    pub metadata: TipsetMetadata,
}

impl ChainHead {
    pub fn weight(&self) -> &Weight {
        &self.metadata.weight
    }
}

/// Tipsets removed from and added to the canonical chain by a head change.
/// `applied` is ordered oldest first, `reverted` newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadChanges {
    pub reverted: Vec<Arc<Tipset>>,
    pub applied: Vec<Arc<Tipset>>,
}

impl HeadChanges {
    /// Events in the order subscribers should observe them.
    pub fn events(&self) -> impl Iterator<Item = HeadChange> + '_ {
        self.reverted
            .iter()
            .cloned()
            .map(HeadChange::Revert)
            .chain(self.applied.iter().cloned().map(HeadChange::Apply))
    }
}

/// Stores chain data such as the heaviest tipset and the metadata of every
/// validated tipset. This structure is thread-safe and can be shared across
/// tasks. The head is only changed through [`ChainStore::set_head`] and
/// [`ChainStore::update_heaviest`], which are serialized.
pub struct ChainStore<DB> {
    /// Publisher for head change events
    publisher: Publisher<HeadChange>,

    /// key-value `datastore`.
    pub db: Arc<DB>,

    /// Used as a cache for tipset `lookbacks`.
    pub chain_index: Arc<ChainIndex<Arc<DB>>>,

    genesis_block_header: CachingBlockHeader,

    head: RwLock<ChainHead>,

    /// Serializes head writers.
    head_writer: Mutex<()>,
}

impl<DB> ChainStore<DB>
where
    DB: Blockstore + SettingsStore,
{
    /// Opens the chain store. The genesis recorded in the repository must
    /// match `genesis_block_header`, a fresh repository is initialized with
    /// it.
    pub fn new(db: Arc<DB>, genesis_block_header: CachingBlockHeader) -> Result<Self, Error> {
        let (publisher, _) = broadcast::channel(SINK_CAP);
        let chain_index = Arc::new(ChainIndex::new(Arc::clone(&db)));
        let genesis_cid = *genesis_block_header.cid();

        match db.read_obj::<Cid>(GENESIS_KEY)? {
            Some(found) if found != genesis_cid => {
                return Err(Error::InvalidGenesis {
                    expected: genesis_cid,
                    found,
                });
            }
            Some(_) => {}
            None => {
                let genesis = Tipset::from(genesis_block_header.clone());
                let metadata = TipsetMetadata {
                    state_root: genesis_block_header.state_root,
                    receipts_root: genesis_block_header.message_receipts,
                    weight: BigInt::from(0),
                };
                persist_messages(db.as_ref(), &[])?;
                put_cbor(db.as_ref(), &Vec::<Receipt>::new())?;
                index_tipset(db.as_ref(), &genesis, &metadata)?;
                db.write_obj(GENESIS_KEY, &genesis_cid)?;
                db.write_obj(HEAD_KEY, genesis.key())?;
                info!("Initialized repository with genesis {genesis_cid}");
            }
        }

        let head_key: TipsetKey = db.require_obj(HEAD_KEY)?;
        let tipset = chain_index.load_tipset(&head_key).map_err(|e| {
            Error::Other(format!("head tipset {head_key} is missing from the repository: {e}"))
        })?;
        let metadata = read_metadata(db.as_ref(), &head_key)?
            .ok_or_else(|| Error::Other(format!("head tipset {head_key} has no metadata")))?;
        debug!("Loaded head {} at epoch {}", head_key, tipset.epoch());

        Ok(Self {
            publisher,
            db,
            chain_index,
            genesis_block_header,
            head: RwLock::new(ChainHead { tipset, metadata }),
            head_writer: Mutex::new(()),
        })
    }

    /// Returns genesis [`CachingBlockHeader`].
    pub fn genesis_block_header(&self) -> &CachingBlockHeader {
        &self.genesis_block_header
    }

    pub fn genesis_tipset(&self) -> Tipset {
        Tipset::from(self.genesis_block_header.clone())
    }

    /// Returns the currently tracked heaviest tipset.
    pub fn heaviest_tipset(&self) -> Arc<Tipset> {
        self.head.read().tipset.clone()
    }

    /// Consistent snapshot of the head and its metadata.
    pub fn head(&self) -> ChainHead {
        self.head.read().clone()
    }

    /// Returns key-value store instance.
    pub fn blockstore(&self) -> &DB {
        &self.db
    }

    pub fn subscribe_head_changes(&self) -> Subscriber<HeadChange> {
        self.publisher.subscribe()
    }

    /// Returns Tipset from key-value store from provided CIDs
    pub fn load_tipset(&self, tsk: &TipsetKey) -> Result<Arc<Tipset>, Error> {
        self.chain_index.load_tipset(tsk)
    }

    /// Returns `true` if every header of the tipset is stored.
    pub fn has_tipset(&self, tsk: &TipsetKey) -> Result<bool, Error> {
        for cid in tsk.iter() {
            if !self.db.has(cid)? {
                return Ok(false);
            }
        }
        Ok(!tsk.is_empty())
    }

    /// A tipset is validated once its execution metadata has been recorded.
    pub fn is_validated(&self, tsk: &TipsetKey) -> Result<bool, Error> {
        Ok(self.db.exists(&metadata_key(tsk))?)
    }

    pub fn tipset_metadata(&self, tsk: &TipsetKey) -> Result<Option<TipsetMetadata>, Error> {
        read_metadata(self.db.as_ref(), tsk)
    }

    /// Keys of every stored tipset at `epoch`, canonical or not.
    pub fn tipsets_at_height(&self, epoch: ChainEpoch) -> Result<Vec<TipsetKey>, Error> {
        Ok(self
            .db
            .read_obj::<Vec<TipsetKey>>(&height_key(epoch))?
            .unwrap_or_default())
    }

    /// Persists a validated tipset without touching the head.
    pub fn put_tipset(&self, ts: &Tipset, metadata: &TipsetMetadata) -> Result<(), Error> {
        index_tipset(self.db.as_ref(), ts, metadata)
    }

    /// Makes `ts` the head. The tipset is indexed, the head key is persisted
    /// and subscribers are notified of the reverted and applied tipsets.
    pub fn set_head(
        &self,
        ts: Arc<Tipset>,
        metadata: TipsetMetadata,
    ) -> Result<HeadChanges, Error> {
        let _writer = self.head_writer.lock();
        self.set_head_locked(ts, metadata)
    }

    /// Makes `ts` the head if it beats the current head under the fork-choice
    /// rule. Returns the head changes if it did.
    pub fn update_heaviest(
        &self,
        ts: Arc<Tipset>,
        metadata: TipsetMetadata,
    ) -> Result<Option<HeadChanges>, Error> {
        self.update_heaviest_with(ts, metadata, |_| {})
    }

    /// Like [`ChainStore::update_heaviest`], calling `reconcile` with the
    /// head changes before the next head writer may run. Components fed from
    /// `reconcile` observe head changes in commit order.
    pub fn update_heaviest_with(
        &self,
        ts: Arc<Tipset>,
        metadata: TipsetMetadata,
        reconcile: impl FnOnce(&HeadChanges),
    ) -> Result<Option<HeadChanges>, Error> {
        let _writer = self.head_writer.lock();
        let current = self.head();
        if !is_heavier(
            (&ts, &metadata.weight),
            (&current.tipset, current.weight()),
        ) {
            debug!(
                "Tipset {} (weight {}) does not beat head {} (weight {})",
                ts.key(),
                metadata.weight,
                current.tipset.key(),
                current.weight()
            );
            self.put_tipset(&ts, &metadata)?;
            return Ok(None);
        }
        info!("New heaviest tipset! {} (EPOCH = {})", ts.key(), ts.epoch());
        let changes = self.set_head_locked(ts, metadata)?;
        reconcile(&changes);
        Ok(Some(changes))
    }

    fn set_head_locked(
        &self,
        ts: Arc<Tipset>,
        metadata: TipsetMetadata,
    ) -> Result<HeadChanges, Error> {
        index_tipset(self.db.as_ref(), &ts, &metadata)?;
        let old = self.heaviest_tipset();
        let changes = self.reorg_path(old, ts.clone())?;
        self.db.write_obj(HEAD_KEY, ts.key())?;
        *self.head.write() = ChainHead {
            tipset: ts,
            metadata,
        };
        for change in changes.events() {
            if self.publisher.send(change).is_err() {
                debug!("did not publish head change, no active receivers");
                break;
            }
        }
        Ok(changes)
    }

    /// Walks `old` and `new` back to their common ancestor.
    pub fn reorg_path(&self, old: Arc<Tipset>, new: Arc<Tipset>) -> Result<HeadChanges, Error> {
        let mut changes = HeadChanges::default();
        let (mut left, mut right) = (old, new);
        while left.key() != right.key() {
            if left.epoch() >= right.epoch() {
                let parent = self.load_tipset(left.parents())?;
                changes.reverted.push(left);
                left = parent;
            } else {
                let parent = self.load_tipset(right.parents())?;
                changes.applied.push(right);
                right = parent;
            }
        }
        changes.applied.reverse();
        Ok(changes)
    }

    /// Ancestor of `from` (the head by default) at epoch `to`.
    pub fn tipset_by_height(
        &self,
        to: ChainEpoch,
        from: Option<Arc<Tipset>>,
        resolve: ResolveNullTipset,
    ) -> Result<Arc<Tipset>, Error> {
        let from = from.unwrap_or_else(|| self.heaviest_tipset());
        self.chain_index.tipset_by_height(to, from, resolve)
    }

    /// Iterates from `from` back to genesis.
    pub fn chain(&self, from: Arc<Tipset>) -> impl Iterator<Item = Arc<Tipset>> + '_ {
        self.chain_index.chain(from)
    }
}

fn metadata_key(tsk: &TipsetKey) -> String {
    format!("{TIPSET_METADATA_PREFIX}/{tsk}")
}

fn height_key(epoch: ChainEpoch) -> String {
    format!("{HEIGHT_INDEX_PREFIX}/{epoch}")
}

fn read_metadata<DB: SettingsStore>(
    db: &DB,
    tsk: &TipsetKey,
) -> Result<Option<TipsetMetadata>, Error> {
    Ok(db.read_obj(&metadata_key(tsk))?)
}

fn index_tipset<DB>(db: &DB, ts: &Tipset, metadata: &TipsetMetadata) -> Result<(), Error>
where
    DB: Blockstore + SettingsStore,
{
    ts.persist(db)?;
    db.write_obj(&metadata_key(ts.key()), metadata)?;
    let key = height_key(ts.epoch());
    let mut keys: Vec<TipsetKey> = db.read_obj(&key)?.unwrap_or_default();
    if !keys.contains(ts.key()) {
        keys.push(ts.key().clone());
        db.write_obj(&key, &keys)?;
    }
    Ok(())
}
