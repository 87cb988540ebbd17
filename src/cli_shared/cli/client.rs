// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Client {
    /// Run without reaching the network. Published messages stay local.
    pub offline: bool,
    /// Directory of the hourly rolling log files. No file logging if unset.
    pub log_dir: Option<PathBuf>,
    /// How many canonical tipsets message lookups search before waiting.
    pub message_lookback: Option<usize>,
}
