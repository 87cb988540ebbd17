// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod config;
mod errors;
pub mod metrics;
mod msgpool;
pub mod outbox;

pub use self::{
    config::{MpoolConfig, OutboxConfig},
    errors::*,
    msgpool::{
        ingest_messages,
        msg_pool::{MessagePool, MsgSet},
        provider::{ChainStoreProvider, Provider},
        validate_incoming,
    },
    outbox::{Outbox, OutboxPolicy, QueuedMessage},
};
