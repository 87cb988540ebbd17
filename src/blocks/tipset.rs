// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use super::{Block, CachingBlockHeader, RawBlockHeader, Ticket};
use crate::shim::{address::Address, clock::ChainEpoch};
use crate::utils::encoding::blake2b_256;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use itertools::Itertools as _;
use num_bigint::BigInt;
use nunny::Vec as NonEmpty;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A set of CIDs forming a unique key for a tipset.
/// Equal keys have equivalent iteration order: the canonical order of the
/// blocks in the tipset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipsetKey(Vec<Cid>);

impl TipsetKey {
    pub fn iter(&self) -> impl Iterator<Item = &Cid> {
        self.0.iter()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.0.contains(cid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Only the parents of the genesis block are empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_cids(self) -> Vec<Cid> {
        self.0
    }

    /// Byte representation used for deterministic tie-breaks.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|c| c.to_bytes()).collect()
    }
}

impl From<Vec<Cid>> for TipsetKey {
    fn from(value: Vec<Cid>) -> Self {
        Self(value)
    }
}

impl fmt::Display for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(","))
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CreateTipsetError {
    #[error("tipsets must not be empty")]
    Empty,
    #[error(
        "parent CID is inconsistent. All block headers in a tipset must agree on their parent tipset"
    )]
    BadParents,
    #[error(
        "state root is inconsistent. All block headers in a tipset must agree on their parent state root"
    )]
    BadStateRoot,
    #[error("parent weight is inconsistent. All block headers in a tipset must agree on their parent weight")]
    BadWeight,
    #[error("epoch is inconsistent. All block headers in a tipset must agree on their epoch")]
    BadEpoch,
    #[error("duplicate block CID {0}")]
    Duplicate(Cid),
    #[error("miner {0} produced more than one block in the tipset")]
    DuplicateMiner(Address),
}

/// An immutable set of blocks at the same height with the same parent set.
/// Blocks in a tipset are canonically ordered by ticket size.
#[derive(Clone, Debug)]
pub struct Tipset {
    /// Sorted
    headers: NonEmpty<CachingBlockHeader>,
    key: TipsetKey,
}

impl PartialEq for Tipset {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Tipset {}

impl From<RawBlockHeader> for Tipset {
    fn from(value: RawBlockHeader) -> Self {
        Self::from(CachingBlockHeader::from(value))
    }
}

impl From<CachingBlockHeader> for Tipset {
    fn from(value: CachingBlockHeader) -> Self {
        let key = TipsetKey(vec![*value.cid()]);
        Self {
            headers: nunny::vec![value],
            key,
        }
    }
}

impl Tipset {
    /// Builds a new tipset from a collection of blocks.
    /// A valid tipset contains a non-empty collection of blocks that have
    /// distinct miners and all specify identical epoch, parents, weight and
    /// parent state root.
    pub fn new<H: Into<CachingBlockHeader>>(
        headers: impl IntoIterator<Item = H>,
    ) -> Result<Self, CreateTipsetError> {
        let mut headers = headers.into_iter().map(Into::into).collect_vec();
        let first = headers.first().ok_or(CreateTipsetError::Empty)?;
        for header in headers.iter() {
            if header.parents != first.parents {
                return Err(CreateTipsetError::BadParents);
            }
            if header.state_root != first.state_root {
                return Err(CreateTipsetError::BadStateRoot);
            }
            if header.weight != first.weight {
                return Err(CreateTipsetError::BadWeight);
            }
            if header.epoch != first.epoch {
                return Err(CreateTipsetError::BadEpoch);
            }
        }
        headers.sort_by_cached_key(|h| h.tipset_sort_key());
        if let Some((a, _)) = headers.iter().tuple_windows().find(|(a, b)| a.cid() == b.cid()) {
            return Err(CreateTipsetError::Duplicate(*a.cid()));
        }
        if let Some(miner) = headers.iter().map(|h| h.miner_address).duplicates().next() {
            return Err(CreateTipsetError::DuplicateMiner(miner));
        }
        let key = TipsetKey(headers.iter().map(|h| *h.cid()).collect());
        let headers = headers.try_into().map_err(|_| CreateTipsetError::Empty)?;
        Ok(Self { headers, key })
    }

    /// Loads a tipset from the blockstore. Returns [`None`] if any of the
    /// headers is missing.
    pub fn load(store: &impl Blockstore, tsk: &TipsetKey) -> anyhow::Result<Option<Tipset>> {
        if tsk.is_empty() {
            return Ok(None);
        }
        let mut headers = Vec::with_capacity(tsk.len());
        for cid in tsk.iter() {
            match CachingBlockHeader::load(store, *cid)? {
                Some(header) => headers.push(header),
                None => return Ok(None),
            }
        }
        Ok(Some(Tipset::new(headers)?))
    }

    /// Writes every header of the tipset into the blockstore.
    pub fn persist(&self, store: &impl Blockstore) -> anyhow::Result<()> {
        for header in self.headers.iter() {
            header.persist(store)?;
        }
        Ok(())
    }

    pub fn epoch(&self) -> ChainEpoch {
        self.min_ticket_block().epoch
    }

    pub fn block_headers(&self) -> &NonEmpty<CachingBlockHeader> {
        &self.headers
    }

    pub fn min_ticket(&self) -> Option<&Ticket> {
        self.min_ticket_block().ticket.as_ref()
    }

    /// Digest of the smallest ticket, used by the fork-choice tie-break.
    pub fn min_ticket_digest(&self) -> [u8; 32] {
        self.min_ticket()
            .map(|t| blake2b_256(t.vrfproof.as_bytes()))
            .unwrap_or_default()
    }

    /// Returns the block with the smallest ticket. All tipsets have at least one block.
    pub fn min_ticket_block(&self) -> &CachingBlockHeader {
        self.headers.first()
    }

    pub fn min_timestamp(&self) -> u64 {
        self.headers
            .iter()
            .map(|block| block.timestamp)
            .min()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.headers.iter().len()
    }

    pub fn key(&self) -> &TipsetKey {
        &self.key
    }

    pub fn cids(&self) -> impl Iterator<Item = &Cid> {
        self.key.iter()
    }

    pub fn parents(&self) -> &TipsetKey {
        &self.min_ticket_block().parents
    }

    /// Parent state root shared by all blocks.
    pub fn parent_state(&self) -> &Cid {
        &self.min_ticket_block().state_root
    }

    /// Weight of the parent tipset as claimed by the blocks.
    pub fn parent_weight(&self) -> &BigInt {
        &self.min_ticket_block().weight
    }

    pub fn is_genesis(&self) -> bool {
        self.epoch() == 0 && self.parents().is_empty()
    }
}

/// A tipset together with the messages carried by each block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullTipset {
    blocks: NonEmpty<Block>,
    key: TipsetKey,
}

impl FullTipset {
    pub fn new(blocks: impl IntoIterator<Item = Block>) -> Result<Self, CreateTipsetError> {
        let blocks = blocks.into_iter().collect_vec();
        let tipset = Tipset::new(blocks.iter().map(|b| b.header.clone()))?;
        let mut blocks = blocks;
        // Same order as the tipset key.
        blocks.sort_by_key(|b| {
            tipset
                .cids()
                .position(|c| c == b.cid())
                .unwrap_or(usize::MAX)
        });
        let blocks = blocks.try_into().map_err(|_| CreateTipsetError::Empty)?;
        Ok(Self {
            blocks,
            key: tipset.key().clone(),
        })
    }

    pub fn blocks(&self) -> &NonEmpty<Block> {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks.into_iter().collect()
    }

    pub fn key(&self) -> &TipsetKey {
        &self.key
    }

    pub fn parents(&self) -> &TipsetKey {
        &self.blocks.first().header.parents
    }

    pub fn epoch(&self) -> ChainEpoch {
        self.blocks.first().header.epoch
    }

    /// Returns the header-only view of this tipset.
    pub fn to_tipset(&self) -> Tipset {
        let headers: Vec<CachingBlockHeader> =
            self.blocks.iter().map(|b| b.header.clone()).collect();
        Tipset {
            headers: headers
                .try_into()
                .expect("a full tipset always has at least one block"),
            key: self.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::VRFProof;
    use crate::utils::cid::CidCborExt as _;

    fn header(miner: u64, ticket: &[u8], parents: TipsetKey, epoch: ChainEpoch) -> RawBlockHeader {
        let empty = Cid::from_cbor_blake2b256(&()).unwrap();
        RawBlockHeader {
            miner_address: Address::new_id(miner),
            ticket: Some(Ticket::new(VRFProof::new(ticket.to_vec()))),
            election_proof: None,
            parents,
            weight: BigInt::from(0),
            epoch,
            state_root: empty,
            message_receipts: empty,
            messages: empty,
            timestamp: 0,
            signature: None,
        }
    }

    #[test]
    fn blocks_are_sorted_by_ticket_digest() {
        let a = header(1, b"a", TipsetKey::default(), 1);
        let b = header(2, b"b", TipsetKey::default(), 1);
        let c = header(3, b"c", TipsetKey::default(), 1);
        let ts1 = Tipset::new([a.clone(), b.clone(), c.clone()]).unwrap();
        let ts2 = Tipset::new([c, a, b]).unwrap();
        assert_eq!(ts1.key(), ts2.key());
        let digests = ts1
            .block_headers()
            .iter()
            .map(|h| blake2b_256(h.ticket.as_ref().unwrap().vrfproof.as_bytes()))
            .collect_vec();
        assert!(digests.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ts1.min_ticket_digest(), digests[0]);
    }

    #[test]
    fn tipset_rejects_inconsistent_blocks() {
        let parent = TipsetKey::from(vec![Cid::from_cbor_blake2b256(&"p").unwrap()]);
        let a = header(1, b"a", TipsetKey::default(), 1);
        assert_eq!(
            Tipset::new([a.clone(), header(2, b"b", parent, 1)]),
            Err(CreateTipsetError::BadParents)
        );
        assert_eq!(
            Tipset::new([a.clone(), header(2, b"b", TipsetKey::default(), 2)]),
            Err(CreateTipsetError::BadEpoch)
        );
        assert_eq!(
            Tipset::new([a.clone(), a.clone()]),
            Err(CreateTipsetError::Duplicate(a.cid()))
        );
        assert_eq!(
            Tipset::new([a.clone(), header(1, b"b", TipsetKey::default(), 1)]),
            Err(CreateTipsetError::DuplicateMiner(Address::new_id(1)))
        );
        assert_eq!(
            Tipset::new(Vec::<RawBlockHeader>::new()),
            Err(CreateTipsetError::Empty)
        );
    }

    #[test]
    fn tipset_key_display_lists_cids() {
        let cid = Cid::from_cbor_blake2b256(&"x").unwrap();
        let key = TipsetKey::from(vec![cid, cid]);
        assert_eq!(key.to_string(), format!("{{{cid},{cid}}}"));
    }
}
