// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::message::Message as _;
use crate::message::SignedMessage;
use crate::shim::{address::Address, clock::ChainEpoch, econ::TokenAmount};

/// Computes what a block producer earns.
pub trait Rewarder: Send + Sync {
    /// Tokens minted to the miner of a block at `epoch`.
    fn block_reward(&self, epoch: ChainEpoch, miner: &Address) -> TokenAmount;

    /// Share of the gas paid by `msg` that goes to the block producer. The
    /// remainder of the gas cost is burnt.
    fn gas_reward(&self, msg: &SignedMessage, gas_used: u64) -> TokenAmount;
}

/// Fixed block reward of 20 tokens; the producer keeps the gas premium.
#[derive(Debug, Clone)]
pub struct DefaultRewarder {
    block_reward: TokenAmount,
}

impl Default for DefaultRewarder {
    fn default() -> Self {
        Self {
            block_reward: TokenAmount::from_whole(20),
        }
    }
}

impl Rewarder for DefaultRewarder {
    fn block_reward(&self, _epoch: ChainEpoch, _miner: &Address) -> TokenAmount {
        self.block_reward.clone()
    }

    fn gas_reward(&self, msg: &SignedMessage, gas_used: u64) -> TokenAmount {
        std::cmp::min(msg.gas_premium(), msg.gas_fee_cap()) * gas_used
    }
}

/// Pays constant amounts regardless of the block or message.
#[derive(Debug, Clone, Default)]
pub struct FixedRewarder {
    pub block_reward: TokenAmount,
    pub gas_reward: TokenAmount,
}

impl Rewarder for FixedRewarder {
    fn block_reward(&self, _epoch: ChainEpoch, _miner: &Address) -> TokenAmount {
        self.block_reward.clone()
    }

    fn gas_reward(&self, _msg: &SignedMessage, _gas_used: u64) -> TokenAmount {
        self.gas_reward.clone()
    }
}
