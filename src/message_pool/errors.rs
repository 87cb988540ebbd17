// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::chain::Error as ChainError;
use crate::key_management::Error as KeyError;
use crate::shim::address::Address;
use thiserror::Error;

/// MessagePool error.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid message signature: {0}")]
    InvalidSignature(String),
    #[error("Message sequence too low: {sequence} < {confirmed}")]
    SequenceTooLow { sequence: u64, confirmed: u64 },
    #[error("Message sequence {sequence} too far ahead of {confirmed}")]
    SequenceTooHigh { sequence: u64, confirmed: u64 },
    #[error("Another message from {from} with sequence {sequence} is already pending")]
    NonceConflict { from: Address, sequence: u64 },
    #[error("Message pool is full")]
    PoolFull,
    #[error("Cannot send a negative value")]
    NegativeValue,
    #[error("Gas fee cap and premium must not be negative")]
    NegativeGasPrice,
    #[error("Sender and recipient are the same address")]
    SelfSend,
    #[error("Not enough funds to execute transaction")]
    NotEnoughFunds,
    #[error("Queued nonces must be contiguous: expected {expected}, got {got}")]
    NonContiguousNonce { expected: u64, got: u64 },
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Publishing failed: {0}")]
    Publish(String),
    #[error("{0}")]
    Other(String),
}

impl From<ChainError> for Error {
    fn from(ce: ChainError) -> Self {
        Error::Other(ce.to_string())
    }
}

impl From<fvm_ipld_encoding::Error> for Error {
    fn from(ee: fvm_ipld_encoding::Error) -> Self {
        Error::Other(ee.to_string())
    }
}

impl From<KeyError> for Error {
    fn from(ke: KeyError) -> Self {
        Error::Signing(ke.to_string())
    }
}
