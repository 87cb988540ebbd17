// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::OnceLock;

use super::{ElectionProof, Ticket, TipsetKey};
use crate::shim::{address::Address, clock::ChainEpoch, crypto::Signature};
use crate::utils::cid::{cbor_block, get_cbor};
use crate::utils::encoding::blake2b_256;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

#[derive(Deserialize_tuple, Serialize_tuple, Clone, Hash, Eq, PartialEq, Debug)]
pub struct RawBlockHeader {
    /// The address of the miner actor that mined this block
    pub miner_address: Address,
    pub ticket: Option<Ticket>,
    pub election_proof: Option<ElectionProof>,
    /// The set of parents this block was based on.
    /// Typically one, but can be several in the case where there were multiple
    /// winning ticket-holders for an epoch
    pub parents: TipsetKey,
    /// The aggregate chain weight of the parent set
    #[serde(with = "fvm_shared4::bigint::bigint_ser")]
    pub weight: BigInt,
    /// The round in which this block was mined.
    pub epoch: ChainEpoch,
    /// The CID of the parent state root after calculating parent tipset.
    pub state_root: Cid,
    /// The CID of the receipts produced by executing the parent tipset
    pub message_receipts: Cid,
    /// The CID of the message batch carried by this block
    pub messages: Cid,
    /// Block creation time, in seconds since the Unix epoch
    pub timestamp: u64,
    pub signature: Option<Signature>,
}

impl RawBlockHeader {
    pub fn cid(&self) -> Cid {
        self.car_block().expect("CBOR serialization failed").0
    }

    pub fn car_block(&self) -> anyhow::Result<(Cid, Vec<u8>)> {
        cbor_block(self)
    }

    /// Blocks of a tipset are ordered by the digest of their ticket, then by CID bytes.
    pub(super) fn tipset_sort_key(&self) -> ([u8; 32], Vec<u8>) {
        let ticket_hash = self
            .ticket
            .as_ref()
            .map(|t| blake2b_256(t.vrfproof.as_bytes()))
            .unwrap_or_default();
        (ticket_hash, self.cid().to_bytes())
    }

    /// Serializes the header to bytes for signing purposes i.e. without the
    /// signature field
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut blk = self.clone();
        blk.signature = None;
        fvm_ipld_encoding::to_vec(&blk).expect("block serialization cannot fail")
    }
}

/// A [`RawBlockHeader`] which caches calls to [`RawBlockHeader::cid`]
#[derive(Debug, derive_more::Deref)]
pub struct CachingBlockHeader {
    #[deref]
    uncached: RawBlockHeader,
    cid: OnceLock<Cid>,
}

impl PartialEq for CachingBlockHeader {
    fn eq(&self, other: &Self) -> bool {
        // Epoch check is redundant but cheap.
        self.uncached.epoch == other.uncached.epoch && self.cid() == other.cid()
    }
}

impl Eq for CachingBlockHeader {}

impl Clone for CachingBlockHeader {
    fn clone(&self) -> Self {
        Self {
            uncached: self.uncached.clone(),
            cid: self.cid.clone(),
        }
    }
}

impl From<RawBlockHeader> for CachingBlockHeader {
    fn from(value: RawBlockHeader) -> Self {
        Self::new(value)
    }
}

impl CachingBlockHeader {
    pub fn new(uncached: RawBlockHeader) -> Self {
        Self {
            uncached,
            cid: OnceLock::new(),
        }
    }

    pub fn into_raw(self) -> RawBlockHeader {
        self.uncached
    }

    /// Returns [`None`] if the blockstore doesn't contain the CID.
    pub fn load(store: &impl Blockstore, cid: Cid) -> anyhow::Result<Option<Self>> {
        if let Some(uncached) = get_cbor::<RawBlockHeader>(store, &cid)? {
            Ok(Some(Self {
                uncached,
                cid: cid.into(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Writes the header into the blockstore under its CID.
    pub fn persist(&self, store: &impl Blockstore) -> anyhow::Result<Cid> {
        let (cid, data) = self.uncached.car_block()?;
        store.put_keyed(&cid, &data)?;
        Ok(cid)
    }

    pub fn cid(&self) -> &Cid {
        self.cid.get_or_init(|| self.uncached.cid())
    }
}

impl From<CachingBlockHeader> for RawBlockHeader {
    fn from(value: CachingBlockHeader) -> Self {
        value.into_raw()
    }
}

impl Serialize for CachingBlockHeader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.uncached.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CachingBlockHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawBlockHeader::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::VRFProof;
    use crate::db::MemoryDB;
    use crate::shim::crypto::Signature;
    use crate::utils::cid::CidCborExt as _;

    fn header(epoch: ChainEpoch) -> RawBlockHeader {
        let empty = Cid::from_cbor_blake2b256(&()).unwrap();
        RawBlockHeader {
            miner_address: Address::new_id(1000),
            ticket: Some(Ticket::new(VRFProof::new(vec![1, 2, 3]))),
            election_proof: None,
            parents: TipsetKey::default(),
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
    fn signing_bytes_ignore_signature() {
        let unsigned = header(1);
        let mut signed = unsigned.clone();
        signed.signature = Some(Signature::new_secp256k1(vec![9; 65]));
        assert_eq!(unsigned.signing_bytes(), signed.signing_bytes());
        assert_ne!(unsigned.cid(), signed.cid());
    }

    #[test]
    fn persisted_header_loads_with_same_cid() {
        let db = MemoryDB::default();
        let header = CachingBlockHeader::new(header(3));
        let cid = header.persist(&db).unwrap();
        assert_eq!(&cid, header.cid());
        let loaded = CachingBlockHeader::load(&db, cid).unwrap().unwrap();
        assert_eq!(loaded, header);
        assert!(
            CachingBlockHeader::load(&db, Cid::from_cbor_blake2b256(&"nope").unwrap())
                .unwrap()
                .is_none()
        );
    }
}
