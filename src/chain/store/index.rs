// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::{Tipset, TipsetKey};
use crate::metrics;
use crate::shim::clock::ChainEpoch;
use fvm_ipld_blockstore::Blockstore;
use hashlink::LruCache;
use parking_lot::Mutex;

use crate::chain::Error;

const DEFAULT_TIPSET_CACHE_SIZE: usize = 8192;

type TipsetCache = Mutex<LruCache<TipsetKey, Arc<Tipset>>>;

/// Caches loaded tipsets and walks the ancestry of a tipset.
pub struct ChainIndex<DB> {
    /// `Arc` reference tipset cache.
    ts_cache: TipsetCache,

    /// `Blockstore` pointer needed to load tipsets from cold storage.
    db: DB,
}

#[derive(Debug, Clone, Copy)]
/// Methods for resolving fetches of null tipsets.
/// Imagine epoch 10 is null but epoch 9 and 11 exist. If epoch we request epoch
/// 10, should 9 or 11 be returned?
pub enum ResolveNullTipset {
    TakeNewer,
    TakeOlder,
}

impl<DB: Blockstore> ChainIndex<DB> {
    pub fn new(db: DB) -> Self {
        let ts_cache = Mutex::new(LruCache::new(DEFAULT_TIPSET_CACHE_SIZE));
        Self { ts_cache, db }
    }

    /// Loads a tipset from memory given the tipset keys and cache. Semantically
    /// identical to [`Tipset::load`] but the result is cached.
    pub fn load_tipset(&self, tsk: &TipsetKey) -> Result<Arc<Tipset>, Error> {
        if let Some(ts) = self.ts_cache.lock().get(tsk) {
            metrics::LRU_CACHE_HIT
                .get_or_create(&metrics::values::TIPSET)
                .inc();
            return Ok(ts.clone());
        }

        let ts = Arc::new(
            Tipset::load(&self.db, tsk)?.ok_or_else(|| Error::NotFound(format!("tipset {tsk}")))?,
        );
        self.ts_cache.lock().insert(tsk.clone(), ts.clone());
        metrics::LRU_CACHE_MISS
            .get_or_create(&metrics::values::TIPSET)
            .inc();
        Ok(ts)
    }

    /// Find tipset at epoch `to` in the chain of ancestors starting at `from`.
    /// Passing `from` disambiguates forks: the result is always an ancestor
    /// of `from` (or `from` itself).
    ///
    /// If the requested epoch is null, `resolve` picks the nearest older or
    /// the nearest younger tipset of that ancestry.
    pub fn tipset_by_height(
        &self,
        to: ChainEpoch,
        from: Arc<Tipset>,
        resolve: ResolveNullTipset,
    ) -> Result<Arc<Tipset>, Error> {
        if to > from.epoch() {
            return Err(Error::Other(
                "Looking for tipset with height greater than start point".to_string(),
            ));
        }

        let mut child: Option<Arc<Tipset>> = None;
        for tipset in self.chain(from) {
            if tipset.epoch() == to {
                return Ok(tipset);
            }
            if tipset.epoch() < to {
                // We're at a point where child.epoch() > to > tipset.epoch().
                return match (resolve, child) {
                    (ResolveNullTipset::TakeNewer, Some(child)) => Ok(child),
                    _ => Ok(tipset),
                };
            }
            child = Some(tipset);
        }
        Err(Error::NotFound(format!("tipset with epoch={to}")))
    }

    /// Iterate from the given tipset to genesis. Missing tipsets cut the chain
    /// short.
    pub fn chain(&self, from: Arc<Tipset>) -> impl Iterator<Item = Arc<Tipset>> + '_ {
        itertools::unfold(Some(from), move |tipset| {
            tipset.take().map(|child| {
                *tipset = if child.parents().is_empty() {
                    None
                } else {
                    self.load_tipset(child.parents()).ok()
                };
                child
            })
        })
    }
}
