// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::Display as StrumDisplay;

use crate::blocks::BLOCK_MESSAGE_LIMIT;
use crate::shim::clock::{ALLOWABLE_CLOCK_DRIFT, ChainEpoch, EPOCH_DURATION_SECONDS};

/// Networks the node knows the protocol schedule of. Any other name is
/// treated as a development network with every upgrade active from genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(test, derive(derive_quickcheck_arbitrary::Arbitrary))]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum NetworkChain {
    Mainnet,
    Calibnet,
    Devnet(String),
}

impl FromStr for NetworkChain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(NetworkChain::Mainnet),
            "calibnet" => Ok(NetworkChain::Calibnet),
            name => Ok(NetworkChain::Devnet(name.to_owned())),
        }
    }
}

impl Display for NetworkChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkChain::Mainnet => write!(f, "mainnet"),
            NetworkChain::Calibnet => write!(f, "calibnet"),
            NetworkChain::Devnet(name) => write!(f, "{name}"),
        }
    }
}

/// Defines the meaningful heights of the protocol.
#[derive(Debug, Default, StrumDisplay, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(derive_quickcheck_arbitrary::Arbitrary))]
pub enum Height {
    #[default]
    Genesis,
    Breeze,
    Smoke,
}

/// Version of the consensus rules in force at a given height.
#[derive(Debug, StrumDisplay, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    V0,
    V1,
    V2,
}

impl From<Height> for ProtocolVersion {
    fn from(height: Height) -> ProtocolVersion {
        match height {
            Height::Genesis => ProtocolVersion::V0,
            Height::Breeze => ProtocolVersion::V1,
            Height::Smoke => ProtocolVersion::V2,
        }
    }
}

/// Rules that change between protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolRules {
    pub version: ProtocolVersion,
    /// Maximum number of messages a block may carry.
    pub block_message_limit: usize,
    /// Seconds a block timestamp may be ahead of the local clock.
    pub allowable_clock_drift: u64,
}

impl From<ProtocolVersion> for ProtocolRules {
    fn from(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::V0 | ProtocolVersion::V1 => Self {
                version,
                block_message_limit: BLOCK_MESSAGE_LIMIT,
                allowable_clock_drift: ALLOWABLE_CLOCK_DRIFT,
            },
            ProtocolVersion::V2 => Self {
                version,
                block_message_limit: BLOCK_MESSAGE_LIMIT / 2,
                allowable_clock_drift: ALLOWABLE_CLOCK_DRIFT,
            },
        }
    }
}

#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[cfg_attr(test, derive(derive_quickcheck_arbitrary::Arbitrary))]
pub struct HeightInfo {
    pub height: Height,
    pub epoch: ChainEpoch,
}

pub fn sort_by_epoch(height_info_slice: &[HeightInfo]) -> Vec<HeightInfo> {
    let mut height_info_vec = height_info_slice.to_vec();
    height_info_vec.sort_by(|a, b| a.epoch.cmp(&b.epoch));
    height_info_vec
}

/// Upgrade schedule of a network.
pub fn height_infos(network: &NetworkChain) -> Vec<HeightInfo> {
    let (breeze, smoke) = match network {
        NetworkChain::Mainnet => (41_280, 51_000),
        NetworkChain::Calibnet => (-1, 120),
        NetworkChain::Devnet(_) => (-1, -2),
    };
    vec![
        HeightInfo {
            height: Height::Breeze,
            epoch: breeze,
        },
        HeightInfo {
            height: Height::Smoke,
            epoch: smoke,
        },
    ]
}

/// Defines all network configuration parameters.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[cfg_attr(test, derive(derive_quickcheck_arbitrary::Arbitrary))]
#[serde(default)]
pub struct ChainConfig {
    pub network: NetworkChain,
    pub block_delay_secs: u32,
    pub propagation_delay_secs: u32,
    /// Filled from the network name recorded in the genesis state.
    #[serde(skip)]
    pub height_infos: Vec<HeightInfo>,
}

impl ChainConfig {
    pub fn mainnet() -> Self {
        Self::from_chain(&NetworkChain::Mainnet)
    }

    pub fn devnet() -> Self {
        Self {
            block_delay_secs: 4,
            propagation_delay_secs: 1,
            ..Self::from_chain(&NetworkChain::Devnet("devnet".to_string()))
        }
    }

    pub fn from_chain(network_chain: &NetworkChain) -> Self {
        Self {
            network: network_chain.clone(),
            block_delay_secs: EPOCH_DURATION_SECONDS as u32,
            propagation_delay_secs: 10,
            height_infos: height_infos(network_chain),
        }
    }

    /// Selects the upgrade schedule of the network named in the genesis
    /// state. Other settings are left untouched.
    pub fn configure_protocol_versions(&mut self, network_name: &str) -> anyhow::Result<()> {
        let network = NetworkChain::from_str(network_name)?;
        self.height_infos = height_infos(&network);
        self.network = network;
        Ok(())
    }

    pub fn protocol_version(&self, epoch: ChainEpoch) -> ProtocolVersion {
        let height = sort_by_epoch(&self.height_infos)
            .iter()
            .rev()
            .find(|info| epoch > info.epoch)
            .map(|info| info.height)
            .unwrap_or(Height::Genesis);

        From::from(height)
    }

    pub fn rules(&self, epoch: ChainEpoch) -> ProtocolRules {
        self.protocol_version(epoch).into()
    }

    pub fn epoch(&self, height: Height) -> ChainEpoch {
        sort_by_epoch(&self.height_infos)
            .iter()
            .find(|info| height == info.height)
            .map(|info| info.epoch)
            .unwrap_or(0)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig::mainnet()
    }
}
