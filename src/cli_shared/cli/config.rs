// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::chain_sync::SyncConfig;
use crate::genesis::GenesisConfig;
use crate::message_pool::{MpoolConfig, OutboxConfig};
use crate::networks::ChainConfig;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

use super::client::Client;

/// Log level of one module, e.g. `module = "forest_core::chain_sync"`,
/// `level = "debug"`.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    pub level: String,
}

impl LogValue {
    pub fn new(module: &str, level: LevelFilter) -> Self {
        Self {
            module: module.to_string(),
            level: level.to_string().to_lowercase(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Level of everything without a filter of its own
    pub default_level: String,
    pub filters: Vec<LogValue>,
}

impl LogConfig {
    pub(in crate::cli_shared) fn to_filter_string(&self) -> String {
        std::iter::once(self.default_level.clone())
            .chain(
                self.filters
                    .iter()
                    .map(|f| format!("{}={}", f.module, f.level)),
            )
            .join(",")
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            filters: vec![
                LogValue::new("forest_core::chain::store::chain_store", LevelFilter::INFO),
                LogValue::new("forest_core::message_pool", LevelFilter::INFO),
            ],
        }
    }
}

/// Node configuration, read from a TOML file. Every section and field is
/// optional.
#[derive(Serialize, Deserialize, PartialEq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub chain: ChainConfig,
    pub genesis: GenesisConfig,
    pub sync: SyncConfig,
    pub mpool: MpoolConfig,
    pub outbox: OutboxConfig,
    pub log: LogConfig,
}
