// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::DAG_CBOR;
use multihash_codetable::{Code, MultihashDigest as _};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Extension methods for constructing `dag-cbor` [Cid]
pub trait CidCborExt {
    /// Default CID builder for Filecoin
    ///
    /// - The default codec is [`fvm_ipld_encoding::DAG_CBOR`]
    /// - The default hash function is 256 bit BLAKE2b
    fn from_cbor_blake2b256<S: Serialize>(obj: &S) -> anyhow::Result<Cid> {
        Ok(cbor_block(obj)?.0)
    }
}

impl CidCborExt for Cid {}

/// Encodes `obj` as `dag-cbor` and returns its CID along with the encoded bytes.
pub fn cbor_block<S: Serialize>(obj: &S) -> anyhow::Result<(Cid, Vec<u8>)> {
    let data = fvm_ipld_encoding::to_vec(obj)?;
    let cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&data));
    Ok((cid, data))
}

/// Stores `obj` under its `dag-cbor` CID.
pub fn put_cbor<S: Serialize>(db: &impl Blockstore, obj: &S) -> anyhow::Result<Cid> {
    let (cid, data) = cbor_block(obj)?;
    db.put_keyed(&cid, &data)?;
    Ok(cid)
}

/// Loads and decodes a `dag-cbor` object. Returns [`None`] if the CID is unknown.
pub fn get_cbor<T: DeserializeOwned>(db: &impl Blockstore, cid: &Cid) -> anyhow::Result<Option<T>> {
    match db.get(cid)? {
        Some(bytes) => Ok(Some(fvm_ipld_encoding::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
