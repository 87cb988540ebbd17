// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Mapping between wall-clock time and chain epochs.

use std::sync::Arc;

use crate::shim::clock::ChainEpoch;

/// Source of the current time, in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Returns the epoch the network is expected to be at, given the genesis
/// timestamp and the block delay.
pub fn calculate_expected_epoch(
    now_timestamp: u64,
    genesis_timestamp: u64,
    block_delay: u32,
) -> ChainEpoch {
    (now_timestamp.saturating_sub(genesis_timestamp) / u64::from(block_delay.max(1))) as ChainEpoch
}

/// Clock anchored at the genesis timestamp of a chain.
#[derive(Clone)]
pub struct ChainClock {
    clock: Arc<dyn Clock>,
    genesis_timestamp: u64,
    block_delay: u32,
}

impl ChainClock {
    pub fn new(clock: Arc<dyn Clock>, genesis_timestamp: u64, block_delay: u32) -> Self {
        Self {
            clock,
            genesis_timestamp,
            block_delay,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn block_delay(&self) -> u32 {
        self.block_delay
    }

    pub fn genesis_timestamp(&self) -> u64 {
        self.genesis_timestamp
    }

    /// Round a timestamp falls into. Timestamps before genesis map to epoch 0.
    pub fn epoch_at_time(&self, timestamp: u64) -> ChainEpoch {
        calculate_expected_epoch(timestamp, self.genesis_timestamp, self.block_delay)
    }

    pub fn current_epoch(&self) -> ChainEpoch {
        self.epoch_at_time(self.now())
    }

    /// First second of `epoch`.
    pub fn epoch_start(&self, epoch: ChainEpoch) -> u64 {
        self.genesis_timestamp + epoch.max(0) as u64 * u64::from(self.block_delay)
    }
}

impl std::fmt::Debug for ChainClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClock")
            .field("genesis_timestamp", &self.genesis_timestamp)
            .field("block_delay", &self.block_delay)
            .finish()
    }
}

/// Manually driven clock.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeClock(std::sync::atomic::AtomicU64);

#[cfg(test)]
impl FakeClock {
    pub fn new(now: u64) -> Self {
        Self(now.into())
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
