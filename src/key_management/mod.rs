// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Signing and signature verification seams. Key storage and the signature
//! schemes themselves live behind these traits.

use crate::message::SignedMessage;
use crate::shim::{address::Address, crypto::Signature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No key is available for the address
    #[error("Key not found for {0}")]
    NoKey(Address),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("{0}")]
    Other(String),
}

/// Signs payloads on behalf of local addresses.
pub trait Wallet: Send + Sync {
    fn sign(&self, addr: &Address, payload: &[u8]) -> Result<Signature, Error>;
}

/// Checks signatures produced by [`Wallet`]s.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, sig: &Signature, addr: &Address, payload: &[u8]) -> Result<(), Error>;

    /// Checks that a message was signed by its sender.
    fn verify_message(&self, msg: &SignedMessage) -> Result<(), Error> {
        let payload = SignedMessage::signing_bytes(msg.message())
            .map_err(|e| Error::Other(e.to_string()))?;
        self.verify(msg.signature(), &msg.message().from, &payload)
    }
}

/// Wallet of a node without a key backend. Every signing request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredWallet;

impl Wallet for UnconfiguredWallet {
    fn sign(&self, addr: &Address, _payload: &[u8]) -> Result<Signature, Error> {
        Err(Error::NoKey(*addr))
    }
}

/// Verifier of a node without a signature backend. Every signature is
/// rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredVerifier;

impl SignatureVerifier for UnconfiguredVerifier {
    fn verify(&self, _sig: &Signature, _addr: &Address, _payload: &[u8]) -> Result<(), Error> {
        Err(Error::InvalidSignature(
            "no signature verification backend configured".into(),
        ))
    }
}

/// Deterministic stand-in for a signature scheme: the signature is the
/// digest of the signer address and the payload.
#[cfg(test)]
pub mod digest {
    use super::*;
    use crate::utils::encoding::blake2b_256;

    fn digest(addr: &Address, payload: &[u8]) -> Vec<u8> {
        let mut bytes = addr.to_bytes();
        bytes.extend_from_slice(payload);
        blake2b_256(&bytes).to_vec()
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct DigestWallet;

    impl Wallet for DigestWallet {
        fn sign(&self, addr: &Address, payload: &[u8]) -> Result<Signature, Error> {
            Ok(Signature::new_secp256k1(digest(addr, payload)))
        }
    }

    #[derive(Debug, Default, Clone, Copy)]
    pub struct DigestVerifier;

    impl SignatureVerifier for DigestVerifier {
        fn verify(&self, sig: &Signature, addr: &Address, payload: &[u8]) -> Result<(), Error> {
            if sig.bytes() == digest(addr, payload).as_slice() {
                Ok(())
            } else {
                Err(Error::InvalidSignature(format!("bad signature for {addr}")))
            }
        }
    }
}
