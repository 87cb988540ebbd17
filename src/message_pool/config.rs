// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

use crate::shim::clock::ChainEpoch;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;

/// Config available for the [`super::MessagePool`].
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct MpoolConfig {
    /// Pending messages above which admission is refused
    #[default(5000)]
    pub max_pool_size: usize,
    /// How far ahead of the confirmed nonce gossiped messages may be
    #[default(100)]
    pub max_nonce_gap: u64,
    /// Pending messages older than this many tipsets are purged
    #[default(6)]
    pub inbox_max_age_tipsets: ChainEpoch,
}

/// Config available for the [`super::Outbox`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Rounds a queued message may wait to be mined
    #[default(20)]
    pub max_age_rounds: ChainEpoch,
    #[default(Duration::from_secs(30))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sweep_interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_interval_is_written_in_seconds() {
        let config: OutboxConfig = toml::from_str("sweep_interval = 5").unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.max_age_rounds, 20);
        assert_eq!(
            toml::to_string(&OutboxConfig::default()).unwrap(),
            "max_age_rounds = 20\nsweep_interval = 30\n"
        );
    }
}
