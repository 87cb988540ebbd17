// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::CachingBlockHeader;
use crate::message::SignedMessage;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;

/// Limit of messages a single block may carry.
pub const BLOCK_MESSAGE_LIMIT: usize = 10000;

/// A complete block: the header plus the batch of messages it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Block {
    pub header: CachingBlockHeader,
    pub messages: Vec<SignedMessage>,
}

impl Block {
    pub fn header(&self) -> &CachingBlockHeader {
        &self.header
    }

    pub fn messages(&self) -> &[SignedMessage] {
        &self.messages
    }

    /// Returns block's CID. This is the CID of the header, not of the messages.
    pub fn cid(&self) -> &Cid {
        self.header.cid()
    }
}
