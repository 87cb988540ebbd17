// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Builders for chains, blocks and messages shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::blocks::{
    Block, CachingBlockHeader, ElectionProof, FullTipset, RawBlockHeader, Ticket, Tipset,
    TipsetKey, VRFProof,
};
use crate::chain::{
    ChainStore, HeadChanges, TipsetMetadata, message_batch_cid, persist_messages,
};
use crate::chain_sync::consensus::{Consensus as _, ParentTipset};
use crate::chain_sync::{Fetcher, SyncConfig, Syncer};
use crate::clock::{ChainClock, FakeClock};
use crate::db::MemoryDB;
use crate::fil_cns::{ElectionVerifier, ExpectedConsensus};
use crate::genesis::{GenesisAccount, GenesisConfig, GenesisMiner, make_genesis};
use crate::interpreter::Processor;
use crate::key_management::{
    Wallet as _,
    digest::{DigestVerifier, DigestWallet},
};
use crate::message::SignedMessage;
use crate::network::PubsubPublisher;
use crate::networks::ChainConfig;
use crate::shim::{
    address::Address,
    clock::ChainEpoch,
    econ::TokenAmount,
    message::{METHOD_SEND, Message},
};
use crate::state_tree::StoragePower;
use crate::utils::cid::CidCborExt as _;
use async_trait::async_trait;
use cid::Cid;
use num_bigint::BigInt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
/// Funded account sending the test messages.
pub const SENDER: u64 = 100;
pub const RECIPIENT: u64 = 200;

/// Keeps tickets, and with them block CIDs, unique across a test run.
static TICKET_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_ticket(miner: u64) -> Ticket {
    let n = TICKET_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut bytes = miner.to_be_bytes().to_vec();
    bytes.extend_from_slice(&n.to_be_bytes());
    Ticket::new(VRFProof::new(bytes))
}

pub fn unsigned_message(from: u64, to: u64, sequence: u64, value: i64) -> Message {
    Message {
        version: 0,
        from: Address::new_id(from),
        to: Address::new_id(to),
        sequence,
        value: TokenAmount::from_atto(value),
        method_num: METHOD_SEND,
        params: Default::default(),
        gas_limit: 1000,
        gas_fee_cap: TokenAmount::from_atto(1),
        gas_premium: TokenAmount::from_atto(1),
    }
}

/// A message signed by the digest test wallet.
pub fn signed_message(from: u64, to: u64, sequence: u64, value: i64) -> SignedMessage {
    let message = unsigned_message(from, to, sequence, value);
    let payload = SignedMessage::signing_bytes(&message).unwrap();
    let signature = DigestWallet.sign(&message.from, &payload).unwrap();
    SignedMessage::new_unchecked(message, signature)
}

pub fn header_with_ticket(miner: u64, ticket: &[u8]) -> RawBlockHeader {
    let empty = Cid::from_cbor_blake2b256(&()).unwrap();
    RawBlockHeader {
        miner_address: Address::new_id(miner),
        ticket: Some(Ticket::new(VRFProof::new(ticket.to_vec()))),
        election_proof: None,
        parents: TipsetKey::default(),
        weight: BigInt::from(0),
        epoch: 1,
        state_root: empty,
        message_receipts: empty,
        messages: empty,
        timestamp: 0,
        signature: None,
    }
}

fn test_genesis_config(network_name: &str) -> GenesisConfig {
    GenesisConfig {
        timestamp: GENESIS_TIMESTAMP,
        network_name: network_name.into(),
        accounts: vec![GenesisAccount {
            id: SENDER,
            balance: 100,
        }],
        miners: vec![
            GenesisMiner { id: 1000, power: 10 },
            GenesisMiner { id: 1001, power: 10 },
        ],
    }
}

/// Deterministic genesis written into `db`.
pub fn genesis_header(db: &MemoryDB) -> CachingBlockHeader {
    make_genesis(db, &test_genesis_config("devnet")).unwrap()
}

pub fn genesis_tipset(db: &MemoryDB) -> Tipset {
    Tipset::from(genesis_header(db))
}

/// An empty child of `parent`, persisted but neither validated nor indexed.
pub fn tipset_child(db: &MemoryDB, parent: &Tipset, epoch: ChainEpoch) -> Tipset {
    let mut header = header_with_ticket(1000, &[]);
    header.ticket = Some(next_ticket(1000));
    header.parents = parent.key().clone();
    header.epoch = epoch;
    header.state_root = *parent.parent_state();
    header.timestamp = GENESIS_TIMESTAMP + epoch as u64 * 4;
    let ts = Tipset::from(header);
    ts.persist(db).unwrap();
    ts
}

/// Metadata of a child of `parent`, with a chosen weight.
pub fn metadata_with_weight(parent: &Tipset, weight: u64) -> TipsetMetadata {
    let header = parent.min_ticket_block();
    TipsetMetadata {
        state_root: header.state_root,
        receipts_root: header.message_receipts,
        weight: BigInt::from(weight),
    }
}

/// Epoch 1 block of `miner` on top of state `root`.
pub fn construct_block(miner: u64, root: Cid, messages: Vec<SignedMessage>) -> Block {
    let mut header = header_with_ticket(miner, &[]);
    header.ticket = Some(next_ticket(miner));
    header.state_root = root;
    header.messages = message_batch_cid(&messages).unwrap();
    Block {
        header: header.into(),
        messages,
    }
}

pub fn construct_tipset_msgs(
    miners: &[u64],
    root: Cid,
    messages: Vec<SignedMessage>,
) -> FullTipset {
    FullTipset::new(
        miners
            .iter()
            .map(|miner| construct_block(*miner, root, messages.clone())),
    )
    .unwrap()
}

/// Election verifier with a fixed answer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MockVerifier {
    #[default]
    Accept,
    Reject,
    Unavailable,
    Panic,
}

impl ElectionVerifier for MockVerifier {
    fn verify_election(
        &self,
        _proof: &ElectionProof,
        _miner_power: StoragePower,
        _total_power: u128,
        _randomness: &[u8],
    ) -> anyhow::Result<bool> {
        match self {
            MockVerifier::Accept => Ok(true),
            MockVerifier::Reject => Ok(false),
            MockVerifier::Unavailable => anyhow::bail!("verifier is down"),
            MockVerifier::Panic => panic!("verifier crashed"),
        }
    }
}

/// Fetcher whose peers never answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingFetcher;

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch_tipset_segment(
        &self,
        target: &TipsetKey,
        _known: &TipsetKey,
        _window: usize,
    ) -> anyhow::Result<Vec<Block>> {
        anyhow::bail!("no peer serves {target}")
    }
}

/// Publisher remembering what was published.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl PubsubPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.published.lock().push((topic.to_owned(), data));
        Ok(())
    }
}

/// A node's chain over a [`MemoryDB`], with a fake clock and a test genesis
/// funding [`SENDER`] and giving power to miners 1000 and 1001.
pub struct TestChain {
    pub db: Arc<MemoryDB>,
    pub cs: Arc<ChainStore<MemoryDB>>,
    pub clock: Arc<FakeClock>,
    pub chain_config: Arc<ChainConfig>,
    pub genesis_config: GenesisConfig,
    pub verifier: MockVerifier,
    pub shutdown: CancellationToken,
}

impl TestChain {
    pub fn new() -> Self {
        Self::build(
            test_genesis_config("devnet"),
            MockVerifier::Accept,
            Arc::new(FakeClock::new(GENESIS_TIMESTAMP)),
        )
    }

    pub fn with_verifier(verifier: MockVerifier) -> Self {
        Self::build(
            test_genesis_config("devnet"),
            verifier,
            Arc::new(FakeClock::new(GENESIS_TIMESTAMP)),
        )
    }

    pub fn with_network_name(name: &str) -> Self {
        Self::build(
            test_genesis_config(name),
            MockVerifier::Accept,
            Arc::new(FakeClock::new(GENESIS_TIMESTAMP)),
        )
    }

    /// Another node of the same network, starting from genesis and sharing
    /// the clock.
    pub fn fresh_node(&self) -> Self {
        Self::build(
            self.genesis_config.clone(),
            self.verifier,
            self.clock.clone(),
        )
    }

    fn build(genesis_config: GenesisConfig, verifier: MockVerifier, clock: Arc<FakeClock>) -> Self {
        let db = Arc::new(MemoryDB::default());
        let genesis = make_genesis(db.as_ref(), &genesis_config).unwrap();
        let cs = Arc::new(ChainStore::new(db.clone(), genesis).unwrap());
        let mut chain_config = ChainConfig::devnet();
        chain_config
            .configure_protocol_versions(&genesis_config.network_name)
            .unwrap();
        Self {
            db,
            cs,
            clock,
            chain_config: Arc::new(chain_config),
            genesis_config,
            verifier,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn chain_clock(&self) -> ChainClock {
        ChainClock::new(
            self.clock.clone(),
            self.genesis_config.timestamp,
            self.chain_config.block_delay_secs,
        )
    }

    pub fn consensus(&self) -> ExpectedConsensus<MemoryDB> {
        ExpectedConsensus::new(
            self.db.clone(),
            self.chain_config.clone(),
            self.chain_clock(),
            Arc::new(self.verifier),
            Arc::new(DigestVerifier),
            Processor::default(),
        )
    }

    pub fn genesis(&self) -> Arc<Tipset> {
        Arc::new(self.cs.genesis_tipset())
    }

    /// `ts` with its stored metadata. Panics if `ts` is not validated.
    pub fn parent(&self, ts: &Tipset) -> ParentTipset {
        ParentTipset {
            tipset: Arc::new(ts.clone()),
            metadata: self.cs.tipset_metadata(ts.key()).unwrap().unwrap(),
        }
    }

    pub fn genesis_parent(&self) -> ParentTipset {
        self.parent(&self.genesis())
    }

    /// A transfer from [`SENDER`].
    pub fn message(&self, sequence: u64, value: i64) -> SignedMessage {
        signed_message(SENDER, RECIPIENT, sequence, value)
    }

    pub fn child_block(
        &self,
        parent: &ParentTipset,
        miner: u64,
        epoch: ChainEpoch,
        messages: Vec<SignedMessage>,
    ) -> Block {
        self.child_block_with(parent, miner, epoch, messages, |_| {})
    }

    /// A signed block on top of `parent`. `tweak` edits the header before it
    /// is signed. The clock is moved to the start of `epoch`.
    pub fn child_block_with(
        &self,
        parent: &ParentTipset,
        miner: u64,
        epoch: ChainEpoch,
        messages: Vec<SignedMessage>,
        tweak: impl FnOnce(&mut RawBlockHeader),
    ) -> Block {
        let timestamp = self.chain_clock().epoch_start(epoch);
        self.clock.set(timestamp);
        let mut header = RawBlockHeader {
            miner_address: Address::new_id(miner),
            ticket: Some(next_ticket(miner)),
            election_proof: Some(ElectionProof {
                win_count: 1,
                vrfproof: VRFProof::new(next_ticket(miner).vrfproof.0),
            }),
            parents: parent.tipset.key().clone(),
            weight: parent.metadata.weight.clone(),
            epoch,
            state_root: parent.metadata.state_root,
            message_receipts: parent.metadata.receipts_root,
            messages: message_batch_cid(&messages).unwrap(),
            timestamp,
            signature: None,
        };
        tweak(&mut header);
        header.signature = Some(
            DigestWallet
                .sign(&header.miner_address, &header.signing_bytes())
                .unwrap(),
        );
        Block {
            header: header.into(),
            messages,
        }
    }

    /// Extends the current head, see [`TestChain::extend_from`].
    pub fn extend(
        &self,
        miners: &[u64],
        epoch: ChainEpoch,
        messages: Vec<SignedMessage>,
    ) -> Arc<Tipset> {
        self.extend_from(&self.cs.heaviest_tipset(), miners, epoch, messages)
    }

    /// Mines a tipset on `parent` with one block per miner, each carrying
    /// `messages`. The tipset is executed and stored as validated without
    /// consulting the election verifier. The head is left alone.
    pub fn extend_from(
        &self,
        parent: &Tipset,
        miners: &[u64],
        epoch: ChainEpoch,
        messages: Vec<SignedMessage>,
    ) -> Arc<Tipset> {
        let parent = self.parent(parent);
        let full = FullTipset::new(
            miners
                .iter()
                .map(|miner| self.child_block(&parent, *miner, epoch, messages.clone())),
        )
        .unwrap();
        let ts = full.to_tipset();
        let consensus = self.consensus();
        let weight = consensus.weigh(&ts, &parent).unwrap();
        let applied = consensus.run_state_transition(&full, &parent).unwrap();
        persist_messages(self.db.as_ref(), &messages).unwrap();
        self.cs
            .put_tipset(
                &ts,
                &TipsetMetadata {
                    state_root: applied.state_root,
                    receipts_root: applied.receipts_root,
                    weight,
                },
            )
            .unwrap();
        Arc::new(ts)
    }

    /// Makes a stored tipset the head.
    pub fn set_head(&self, ts: &Tipset) -> HeadChanges {
        let metadata = self.cs.tipset_metadata(ts.key()).unwrap().unwrap();
        self.cs.set_head(Arc::new(ts.clone()), metadata).unwrap()
    }

    /// `ts` with the messages of its blocks, as a peer would serve it.
    pub fn full_tipset(&self, ts: &Tipset) -> FullTipset {
        FullTipset::new(ts.block_headers().iter().map(|header| Block {
            header: header.clone(),
            messages: crate::chain::block_messages(self.db.as_ref(), header).unwrap(),
        }))
        .unwrap()
    }

    pub fn syncer(&self, fetcher: Arc<dyn Fetcher>) -> Syncer<MemoryDB> {
        self.syncer_with_config(fetcher, SyncConfig::default())
    }

    pub fn syncer_with_config(
        &self,
        fetcher: Arc<dyn Fetcher>,
        config: SyncConfig,
    ) -> Syncer<MemoryDB> {
        Syncer::new(
            self.cs.clone(),
            Arc::new(self.consensus()),
            fetcher,
            self.chain_clock(),
            config,
            self.shutdown.clone(),
        )
    }
}
