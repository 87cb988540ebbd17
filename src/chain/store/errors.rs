// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::CreateTipsetError;
use cid::Cid;
use thiserror::Error;

/// Chain error
#[derive(Debug, Error)]
pub enum Error {
    /// Key was not found
    #[error("Invalid tipset: {0}")]
    UndefinedKey(String),
    /// Key not found in database
    #[error("{0} not found")]
    NotFound(String),
    /// The repository was initialized with another genesis block
    #[error("genesis mismatch: repository holds {found}, node is configured with {expected}")]
    InvalidGenesis { expected: Cid, found: Cid },
    /// Error originating constructing blockchain structures
    #[error(transparent)]
    Tipset(#[from] CreateTipsetError),
    /// Error originating from encoding arbitrary data
    #[error("{0}")]
    Encoding(String),
    /// Other chain error
    #[error("{0}")]
    Other(String),
}

impl From<fvm_ipld_encoding::Error> for Error {
    fn from(e: fvm_ipld_encoding::Error) -> Error {
        Error::Encoding(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
