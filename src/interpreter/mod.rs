// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod errors;
mod rewarder;

pub use self::errors::*;
pub use self::rewarder::*;

use std::sync::Arc;

use crate::blocks::FullTipset;
use crate::message::{Message as _, SignedMessage};
use crate::shim::{
    address::Address,
    clock::ChainEpoch,
    econ::TokenAmount,
    message::{ExitCode, METHOD_SEND},
};
use crate::state_tree::StateTree;
use crate::utils::cid::put_cbor;
use ahash::HashSet;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::{RawBytes, tuple::*};
use tracing::trace;

/// Result of executing a single message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Receipt {
    pub exit_code: ExitCode,
    pub return_data: RawBytes,
    pub gas_used: u64,
}

/// Output of applying a tipset on top of its parent state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyResult {
    pub state_root: Cid,
    pub receipts_root: Cid,
    pub receipts: Vec<Receipt>,
}

/// Executes the messages of a tipset and pays block rewards.
///
/// Blocks are processed in canonical tipset order. A message carried by more
/// than one block is executed once, on behalf of the first block that
/// includes it. Execution is deterministic and nothing is written to the
/// blockstore unless the whole tipset applies.
#[derive(Clone)]
pub struct Processor {
    rewarder: Arc<dyn Rewarder>,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(Arc::new(DefaultRewarder::default()))
    }
}

impl Processor {
    pub fn new(rewarder: Arc<dyn Rewarder>) -> Self {
        Self { rewarder }
    }

    pub fn apply_tipset(
        &self,
        db: &impl Blockstore,
        tipset: &FullTipset,
        parent_state: &Cid,
    ) -> Result<ApplyResult, Error> {
        let mut state = StateTree::load(db, parent_state)?;
        let epoch = tipset.epoch();
        let mut processed = HashSet::default();
        let mut receipts = Vec::new();

        for block in tipset.blocks().iter() {
            let miner = block.header().miner_address;
            for msg in block.messages() {
                if !processed.insert(msg.cid()) {
                    continue;
                }
                receipts.push(self.apply_message(&mut state, msg, &miner)?);
            }
            self.reward_miner(&mut state, epoch, &miner);
        }

        let state_root = state.flush(db)?;
        let receipts_root = put_cbor(db, &receipts)?;
        trace!(
            "applied tipset {} at epoch {epoch}: {} messages",
            tipset.key(),
            receipts.len()
        );
        Ok(ApplyResult {
            state_root,
            receipts_root,
            receipts,
        })
    }

    fn apply_message(
        &self,
        state: &mut StateTree,
        msg: &SignedMessage,
        miner: &Address,
    ) -> Result<Receipt, Error> {
        let from = msg.from();
        let sender = state
            .get_actor(&from)
            .cloned()
            .ok_or_else(|| Error::InvalidTransition(format!("sender {from} does not exist")))?;
        if sender.sequence != msg.sequence() {
            return Err(Error::InvalidTransition(format!(
                "message {} has sequence {}, expected {}",
                msg.cid(),
                msg.sequence(),
                sender.sequence
            )));
        }
        if msg.value().is_negative() {
            return Err(Error::InvalidTransition(format!(
                "message {} has a negative value",
                msg.cid()
            )));
        }
        if msg.gas_fee_cap().is_negative() || msg.gas_premium().is_negative() {
            return Err(Error::InvalidTransition(format!(
                "message {} has a negative gas price",
                msg.cid()
            )));
        }
        let required = msg.required_funds();
        if sender.balance < required {
            return Err(Error::InvalidTransition(format!(
                "sender {from} cannot cover {required} for message {}",
                msg.cid()
            )));
        }

        let gas_used = msg.gas_limit();
        let gas_cost = msg.gas_fee_cap() * gas_used;
        let transfer = msg.message().method_num == METHOD_SEND;

        let next_sequence = sender.sequence.checked_add(1).ok_or_else(|| {
            Error::InvalidTransition(format!("sender {from} exhausted its nonces"))
        })?;
        let sender = state.get_or_create_actor(from);
        sender.sequence = next_sequence;
        sender.balance -= gas_cost;
        if transfer {
            sender.balance -= msg.value();
            state.get_or_create_actor(msg.to()).balance += msg.value();
        }
        let gas_reward = self.rewarder.gas_reward(msg, gas_used);
        state.get_or_create_actor(*miner).balance += gas_reward;

        Ok(Receipt {
            exit_code: if transfer {
                ExitCode::OK
            } else {
                ExitCode::USR_UNHANDLED_MESSAGE
            },
            return_data: RawBytes::default(),
            gas_used,
        })
    }

    fn reward_miner(&self, state: &mut StateTree, epoch: ChainEpoch, miner: &Address) {
        let reward: TokenAmount = self.rewarder.block_reward(epoch, miner);
        state.get_or_create_actor(*miner).balance += reward;
    }
}
