// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content-addressed storage of the message batches referenced by blocks.
//!
//! Every message is stored under its own CID; a batch is the list of those
//! CIDs, stored under the CID the block header references.

use crate::blocks::{CachingBlockHeader, Tipset};
use crate::chain::Error;
use crate::interpreter::Receipt;
use crate::message::SignedMessage;
use crate::utils::cid::{CidCborExt as _, get_cbor, put_cbor};
use ahash::HashSet;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use itertools::Itertools as _;

/// CID of a message batch, as referenced by a block header.
pub fn message_batch_cid(messages: &[SignedMessage]) -> Result<Cid, Error> {
    let cids = messages.iter().map(SignedMessage::cid).collect_vec();
    Ok(Cid::from_cbor_blake2b256(&cids)?)
}

/// Persists the messages and their batch. Returns the batch CID.
pub fn persist_messages<DB>(db: &DB, messages: &[SignedMessage]) -> Result<Cid, Error>
where
    DB: Blockstore,
{
    let mut cids = Vec::with_capacity(messages.len());
    for message in messages {
        cids.push(put_cbor(db, message)?);
    }
    Ok(put_cbor(db, &cids)?)
}

/// Loads the message batch stored under `batch`.
pub fn load_messages<DB>(db: &DB, batch: &Cid) -> Result<Vec<SignedMessage>, Error>
where
    DB: Blockstore,
{
    let cids: Vec<Cid> =
        get_cbor(db, batch)?.ok_or_else(|| Error::UndefinedKey(format!("no msg root with cid {batch}")))?;
    messages_from_cids(db, &cids)
}

/// Returns messages from key-value store based on a slice of [`Cid`]s.
pub fn messages_from_cids<DB>(db: &DB, keys: &[Cid]) -> Result<Vec<SignedMessage>, Error>
where
    DB: Blockstore,
{
    keys.iter()
        .map(|k| get_message(db, k))
        .collect()
}

pub fn get_message<DB>(db: &DB, key: &Cid) -> Result<SignedMessage, Error>
where
    DB: Blockstore,
{
    get_cbor(db, key)?.ok_or_else(|| Error::UndefinedKey(key.to_string()))
}

pub fn block_messages<DB>(db: &DB, bh: &CachingBlockHeader) -> Result<Vec<SignedMessage>, Error>
where
    DB: Blockstore,
{
    load_messages(db, &bh.messages)
}

/// Given a tipset this function will return all unique messages in that
/// tipset, in execution order: blocks in canonical order, the first
/// occurrence of a message wins.
pub fn messages_for_tipset<DB>(db: &DB, ts: &Tipset) -> Result<Vec<SignedMessage>, Error>
where
    DB: Blockstore,
{
    let mut seen = HashSet::default();
    let mut messages = Vec::new();
    for header in ts.block_headers().iter() {
        for message in block_messages(db, header)? {
            if seen.insert(message.cid()) {
                messages.push(message);
            }
        }
    }
    Ok(messages)
}

/// Loads the receipts produced by executing a tipset.
pub fn load_receipts<DB>(db: &DB, root: &Cid) -> Result<Vec<Receipt>, Error>
where
    DB: Blockstore,
{
    get_cbor(db, root)?.ok_or_else(|| Error::UndefinedKey(format!("no receipts with cid {root}")))
}
