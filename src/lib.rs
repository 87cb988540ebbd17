// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Core of a Filecoin node: chain synchronization, expected consensus
//! validation and the message lifecycle from admission to confirmation.

pub mod blocks;
pub mod chain;
pub mod chain_sync;
pub mod cli_shared;
pub mod clock;
pub mod daemon;
pub mod db;
pub mod fil_cns;
pub mod genesis;
pub mod interpreter;
pub mod key_management;
pub mod message;
pub mod message_pool;
pub mod metrics;
pub mod network;
pub mod networks;
pub mod shim;
pub mod state_tree;
#[cfg(test)]
mod test_utils;
pub mod utils;

pub use cli_shared::cli::{Client, Config};
pub use daemon::main::main as forestd_main;
pub use daemon::{Node, NodeBuilder, run_node};
