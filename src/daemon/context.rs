// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;
use std::time::Duration;

use crate::blocks::CachingBlockHeader;
use crate::chain::{ChainHead, ChainStore, MessageLookup};
use crate::chain_sync::{Fetcher, OfflineFetcher, SyncConfig, SyncStatusReport, Syncer};
use crate::cli_shared::cli::Config;
use crate::clock::{ChainClock, Clock, SystemClock};
use crate::db::{MemoryDB, SettingsStore};
use crate::fil_cns::{ElectionVerifier, ExpectedConsensus, PowerLotteryVerifier};
use crate::genesis::{GenesisConfig, get_network_name_from_genesis, make_genesis};
use crate::interpreter::{DefaultRewarder, Processor, Rewarder};
use crate::key_management::{SignatureVerifier, UnconfiguredVerifier, UnconfiguredWallet, Wallet};
use crate::message::SignedMessage;
use crate::message_pool::{
    self, ChainStoreProvider, MessagePool, MpoolConfig, Outbox, OutboxConfig, OutboxPolicy,
    QueuedMessage, outbox::DefaultMessagePublisher,
};
use crate::network::{OfflinePublisher, PubsubPublisher, message_topic};
use crate::networks::{ChainConfig, NetworkChain};
use crate::shim::message::Message;
use anyhow::Context as _;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Canonical tipsets searched for a message before waiting for new heads.
const DEFAULT_MESSAGE_LOOKBACK: usize = 20;

/// Capabilities and settings a [`Node`] is assembled from. Every option has
/// a default: an in-memory repository, the system clock, the power lottery
/// election verifier and no network access.
pub struct NodeBuilder<DB> {
    db: Arc<DB>,
    chain_config: ChainConfig,
    genesis: GenesisConfig,
    sync: SyncConfig,
    mpool: MpoolConfig,
    outbox: OutboxConfig,
    offline: bool,
    message_lookback: usize,
    clock: Arc<dyn Clock>,
    /// `None` falls back to [`PowerLotteryVerifier`].
    election_verifier: Option<Arc<dyn ElectionVerifier>>,
    signature_verifier: Arc<dyn SignatureVerifier>,
    wallet: Arc<dyn Wallet>,
    rewarder: Arc<dyn Rewarder>,
    fetcher: Arc<dyn Fetcher>,
    pubsub: Arc<dyn PubsubPublisher>,
}

impl Default for NodeBuilder<MemoryDB> {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBuilder<MemoryDB> {
    pub fn new() -> Self {
        Self {
            db: Arc::new(MemoryDB::default()),
            chain_config: ChainConfig::default(),
            genesis: GenesisConfig::default(),
            sync: SyncConfig::default(),
            mpool: MpoolConfig::default(),
            outbox: OutboxConfig::default(),
            offline: false,
            message_lookback: DEFAULT_MESSAGE_LOOKBACK,
            clock: Arc::new(SystemClock),
            election_verifier: None,
            signature_verifier: Arc::new(UnconfiguredVerifier),
            wallet: Arc::new(UnconfiguredWallet),
            rewarder: Arc::new(DefaultRewarder::default()),
            fetcher: Arc::new(OfflineFetcher),
            pubsub: Arc::new(OfflinePublisher),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_chain_config(config.chain.clone())
            .with_genesis(config.genesis.clone())
            .with_sync_config(config.sync.clone())
            .with_mpool_config(config.mpool.clone())
            .with_outbox_config(config.outbox.clone())
            .offline(config.client.offline)
            .with_message_lookback(
                config
                    .client
                    .message_lookback
                    .unwrap_or(DEFAULT_MESSAGE_LOOKBACK),
            )
    }
}

impl<DB> NodeBuilder<DB>
where
    DB: Blockstore + SettingsStore + Send + Sync + 'static,
{
    /// Swaps the repository. A repository initialized with another genesis
    /// makes [`NodeBuilder::build`] fail.
    pub fn with_repository<D>(self, db: Arc<D>) -> NodeBuilder<D> {
        NodeBuilder {
            db,
            chain_config: self.chain_config,
            genesis: self.genesis,
            sync: self.sync,
            mpool: self.mpool,
            outbox: self.outbox,
            offline: self.offline,
            message_lookback: self.message_lookback,
            clock: self.clock,
            election_verifier: self.election_verifier,
            signature_verifier: self.signature_verifier,
            wallet: self.wallet,
            rewarder: self.rewarder,
            fetcher: self.fetcher,
            pubsub: self.pubsub,
        }
    }

    pub fn with_chain_config(mut self, chain_config: ChainConfig) -> Self {
        self.chain_config = chain_config;
        self
    }

    /// Target time between rounds.
    pub fn block_time(mut self, secs: u32) -> Self {
        self.chain_config.block_delay_secs = secs;
        self
    }

    pub fn with_genesis(mut self, genesis: GenesisConfig) -> Self {
        self.genesis = genesis;
        self
    }

    pub fn with_sync_config(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_mpool_config(mut self, mpool: MpoolConfig) -> Self {
        self.mpool = mpool;
        self
    }

    pub fn with_outbox_config(mut self, outbox: OutboxConfig) -> Self {
        self.outbox = outbox;
        self
    }

    /// An offline node keeps published messages local.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_message_lookback(mut self, lookback: usize) -> Self {
        self.message_lookback = lookback;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_election_verifier(mut self, verifier: Arc<dyn ElectionVerifier>) -> Self {
        self.election_verifier = Some(verifier);
        self
    }

    pub fn with_signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.signature_verifier = verifier;
        self
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = wallet;
        self
    }

    pub fn with_rewarder(mut self, rewarder: Arc<dyn Rewarder>) -> Self {
        self.rewarder = rewarder;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_pubsub(mut self, pubsub: Arc<dyn PubsubPublisher>) -> Self {
        self.pubsub = pubsub;
        self
    }

    /// Opens the chain store on the configured genesis and wires the
    /// consensus, the syncer, the message pool and the outbox together.
    pub fn build(self) -> anyhow::Result<Node<DB>> {
        let genesis =
            make_genesis(self.db.as_ref(), &self.genesis).context("Failed to build genesis")?;
        let network_name = get_network_name_from_genesis(&genesis, self.db.as_ref())?;
        let mut chain_config = self.chain_config;
        chain_config.configure_protocol_versions(&network_name)?;
        let chain_config = Arc::new(chain_config);
        let clock = ChainClock::new(
            self.clock,
            genesis.timestamp,
            chain_config.block_delay_secs,
        );

        let cs = Arc::new(
            ChainStore::new(self.db.clone(), genesis.clone())
                .context("Failed to open the chain store")?,
        );
        let head = cs.heaviest_tipset();
        info!(
            "Opened chain {network_name} at epoch {} ({})",
            head.epoch(),
            head.key()
        );

        let election_verifier = self.election_verifier.unwrap_or_else(|| -> Arc<dyn ElectionVerifier> {
            if !matches!(chain_config.network, NetworkChain::Devnet(_)) {
                warn!(
                    "No election verifier configured for {network_name}, falling back to the devnet lottery"
                );
            }
            Arc::new(PowerLotteryVerifier)
        });
        let consensus = Arc::new(ExpectedConsensus::new(
            self.db.clone(),
            chain_config.clone(),
            clock.clone(),
            election_verifier,
            self.signature_verifier.clone(),
            Processor::new(self.rewarder),
        ));

        let provider = Arc::new(ChainStoreProvider::new(cs.clone()));
        let mpool = Arc::new(MessagePool::new(
            provider.clone(),
            self.signature_verifier,
            self.mpool,
        ));
        let publisher = Arc::new(DefaultMessagePublisher::new(
            mpool.clone(),
            self.pubsub,
            message_topic(&network_name),
            self.offline,
        ));
        let outbox = Arc::new(Outbox::new(
            provider,
            self.wallet,
            publisher,
            clock.clone(),
            OutboxPolicy::new(self.outbox.max_age_rounds),
        ));

        let shutdown = CancellationToken::new();
        let syncer = Arc::new(
            Syncer::new(
                cs.clone(),
                consensus,
                self.fetcher,
                clock.clone(),
                self.sync,
                shutdown.child_token(),
            )
            .with_head_change_handler(mpool.clone())
            .with_head_change_handler(outbox.clone()),
        );

        Ok(Node {
            genesis,
            network_name,
            chain_config,
            clock,
            cs,
            syncer,
            mpool,
            outbox,
            outbox_config: self.outbox,
            message_lookback: self.message_lookback,
            shutdown,
        })
    }
}

/// A running node's shared state. Everything the background tasks and the
/// API surface need is reachable from here.
pub struct Node<DB> {
    pub(super) genesis: CachingBlockHeader,
    pub(super) network_name: String,
    pub(super) chain_config: Arc<ChainConfig>,
    pub(super) clock: ChainClock,
    pub(super) cs: Arc<ChainStore<DB>>,
    pub(super) syncer: Arc<Syncer<DB>>,
    pub(super) mpool: Arc<MessagePool<ChainStoreProvider<DB>>>,
    pub(super) outbox: Arc<Outbox<ChainStoreProvider<DB>>>,
    pub(super) outbox_config: OutboxConfig,
    pub(super) message_lookback: usize,
    pub(super) shutdown: CancellationToken,
}

impl<DB> Node<DB>
where
    DB: Blockstore + SettingsStore + Send + Sync + 'static,
{
    pub fn genesis(&self) -> &CachingBlockHeader {
        &self.genesis
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn chain_config(&self) -> &Arc<ChainConfig> {
        &self.chain_config
    }

    pub fn clock(&self) -> &ChainClock {
        &self.clock
    }

    pub fn chain_store(&self) -> &Arc<ChainStore<DB>> {
        &self.cs
    }

    pub fn head(&self) -> ChainHead {
        self.cs.head()
    }

    pub fn status(&self) -> SyncStatusReport {
        self.syncer.status()
    }

    /// Resolves once the node caught up with the network for the first time.
    pub async fn wait_synced(&self) {
        self.syncer.synced_gate().wait().await
    }

    pub fn pending_messages(&self) -> Vec<SignedMessage> {
        self.mpool.pending()
    }

    pub fn queued_messages(&self) -> Vec<QueuedMessage> {
        self.outbox.queued()
    }

    /// Admits a signed message to the pool without broadcasting it.
    pub fn push_message(&self, msg: SignedMessage) -> Result<Cid, message_pool::Error> {
        self.mpool.add(msg)
    }

    /// Signs a message with the node wallet and publishes it. The nonce is
    /// assigned by the outbox.
    pub async fn send_message(&self, msg: Message) -> Result<SignedMessage, message_pool::Error> {
        self.outbox.send(msg).await
    }

    /// The receipt of `message` once it is on the canonical chain, or
    /// `None` after `timeout`.
    pub async fn wait_for_message(
        &self,
        message: Cid,
        timeout: Duration,
    ) -> anyhow::Result<Option<MessageLookup>> {
        Ok(self
            .cs
            .wait_for_message(message, self.message_lookback, timeout)
            .await?)
    }

    /// Asks every background task to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_management::digest::{DigestVerifier, DigestWallet};
    use crate::test_utils::{TestChain, unsigned_message};

    #[test]
    fn defaults_build_an_offline_devnet_node() {
        let node = NodeBuilder::new().build().unwrap();
        assert_eq!(node.network_name(), "devnet");
        assert_eq!(node.head().tipset.epoch(), 0);
        assert!(node.pending_messages().is_empty());
    }

    #[test]
    fn lottery_is_only_the_fallback_verifier() {
        assert!(NodeBuilder::new().election_verifier.is_none());
        let builder = NodeBuilder::new()
            .with_election_verifier(Arc::new(crate::test_utils::MockVerifier::Reject));
        assert!(builder.election_verifier.is_some());
        builder.build().unwrap();
    }

    #[test]
    fn repository_with_another_genesis_is_refused() {
        let db = Arc::new(MemoryDB::default());
        NodeBuilder::new()
            .with_repository(db.clone())
            .build()
            .unwrap();
        let err = NodeBuilder::new()
            .with_repository(db)
            .with_genesis(GenesisConfig {
                timestamp: 42,
                ..Default::default()
            })
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn block_time_drives_the_clock() {
        let node = NodeBuilder::new().block_time(7).build().unwrap();
        assert_eq!(node.clock().block_delay(), 7);
    }

    #[tokio::test]
    async fn sent_messages_are_pending_and_queued() {
        let chain = TestChain::new();
        let node = NodeBuilder::new()
            .with_genesis(chain.genesis_config.clone())
            .with_chain_config(ChainConfig::devnet())
            .with_clock(chain.clock.clone())
            .with_wallet(Arc::new(DigestWallet))
            .with_signature_verifier(Arc::new(DigestVerifier))
            .offline(true)
            .build()
            .unwrap();
        let signed = node
            .send_message(unsigned_message(100, 200, 0, 5))
            .await
            .unwrap();
        assert_eq!(node.pending_messages(), vec![signed.clone()]);
        assert_eq!(node.queued_messages().len(), 1);
    }
}
