// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::Message as MessageTrait;
use crate::shim::{
    address::Address, crypto::Signature, econ::TokenAmount, message::Message,
};
use crate::utils::cid::CidCborExt as _;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;

/// Represents a wrapped message with signature bytes.
#[derive(PartialEq, Clone, Debug, Serialize_tuple, Deserialize_tuple, Hash, Eq)]
pub struct SignedMessage {
    pub message: Message,
    pub signature: Signature,
}

impl SignedMessage {
    /// Generate a new signed message from fields.
    /// The signature will not be verified.
    pub fn new_unchecked(message: Message, signature: Signature) -> SignedMessage {
        SignedMessage { message, signature }
    }

    /// Returns reference to the unsigned message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns signature of the signed message.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Consumes self and returns it's unsigned message.
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Bytes covered by the signature: the encoded unsigned message.
    pub fn signing_bytes(message: &Message) -> anyhow::Result<Vec<u8>> {
        Ok(fvm_ipld_encoding::to_vec(message)?)
    }

    /// Identifier of the message: the hash of the content together with its signature.
    pub fn cid(&self) -> Cid {
        Cid::from_cbor_blake2b256(self).expect("message serialization is infallible")
    }
}

impl MessageTrait for SignedMessage {
    fn from(&self) -> Address {
        self.message.from
    }
    fn to(&self) -> Address {
        self.message.to
    }
    fn sequence(&self) -> u64 {
        self.message.sequence
    }
    fn value(&self) -> TokenAmount {
        self.message.value.clone()
    }
    fn gas_limit(&self) -> u64 {
        self.message.gas_limit
    }
    fn gas_fee_cap(&self) -> TokenAmount {
        self.message.gas_fee_cap.clone()
    }
    fn gas_premium(&self) -> TokenAmount {
        self.message.gas_premium.clone()
    }
}
