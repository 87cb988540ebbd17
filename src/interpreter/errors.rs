// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Interpreter error.
#[derive(Debug, Error)]
pub enum Error {
    /// The tipset cannot be applied on top of its parent state.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("failed to read state from the database: {0}")]
    Lookup(#[from] anyhow::Error),
}
