// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::{Block, Tipset, TipsetKey};
use crate::chain::block_messages;
use anyhow::Context as _;
use async_trait::async_trait;
use fvm_ipld_blockstore::Blockstore;
use tracing::trace;

/// Retrieves chain segments from peers.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Returns the blocks, messages included, of the tipset `target` and of
    /// up to `window - 1` of its ancestors, newest first. Fetchers may stop
    /// early at `known`, a tipset the caller already has. A partial tipset
    /// is a failed fetch.
    async fn fetch_tipset_segment(
        &self,
        target: &TipsetKey,
        known: &TipsetKey,
        window: usize,
    ) -> anyhow::Result<Vec<Block>>;
}

/// Serves segments straight out of a blockstore holding headers and message
/// batches, e.g. a store shared with another node in the same process.
pub struct BlockstoreFetcher<DB> {
    db: Arc<DB>,
}

impl<DB> BlockstoreFetcher<DB> {
    pub fn new(db: Arc<DB>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl<DB> Fetcher for BlockstoreFetcher<DB>
where
    DB: Blockstore + Send + Sync + 'static,
{
    async fn fetch_tipset_segment(
        &self,
        target: &TipsetKey,
        known: &TipsetKey,
        window: usize,
    ) -> anyhow::Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut cursor = target.clone();
        for _ in 0..window {
            if cursor.is_empty() || &cursor == known {
                break;
            }
            let tipset = Tipset::load(self.db.as_ref(), &cursor)?
                .with_context(|| format!("tipset {cursor} not found"))?;
            for header in tipset.block_headers().iter() {
                let messages = block_messages(self.db.as_ref(), header)?;
                blocks.push(Block {
                    header: header.clone(),
                    messages,
                });
            }
            cursor = tipset.parents().clone();
        }
        trace!("Serving {} blocks for {target}", blocks.len());
        Ok(blocks)
    }
}

/// Fetcher of a node without network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch_tipset_segment(
        &self,
        target: &TipsetKey,
        _known: &TipsetKey,
        _window: usize,
    ) -> anyhow::Result<Vec<Block>> {
        anyhow::bail!("offline: cannot fetch {target}")
    }
}
