// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod signed_message;

pub use signed_message::SignedMessage;

use crate::shim::{address::Address, econ::TokenAmount, message::Message as UnsignedMessage};

/// Message interface to interact with Signed and unsigned messages in a generic
/// context.
pub trait Message {
    /// Returns the from address of the message.
    fn from(&self) -> Address;
    /// Returns the destination address of the message.
    fn to(&self) -> Address;
    /// Returns the message sequence or nonce.
    fn sequence(&self) -> u64;
    /// Returns the amount sent in message.
    fn value(&self) -> TokenAmount;
    /// Returns the gas limit for the message.
    fn gas_limit(&self) -> u64;
    /// Returns the fee cap per unit of gas.
    fn gas_fee_cap(&self) -> TokenAmount;
    /// Returns the gas premium paid to the block producer.
    fn gas_premium(&self) -> TokenAmount;
    /// Returns the required funds for the message: value plus the maximum gas cost.
    fn required_funds(&self) -> TokenAmount {
        self.gas_fee_cap() * self.gas_limit() + self.value()
    }
}

impl Message for UnsignedMessage {
    fn from(&self) -> Address {
        self.from
    }
    fn to(&self) -> Address {
        self.to
    }
    fn sequence(&self) -> u64 {
        self.sequence
    }
    fn value(&self) -> TokenAmount {
        self.value.clone()
    }
    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }
    fn gas_fee_cap(&self) -> TokenAmount {
        self.gas_fee_cap.clone()
    }
    fn gas_premium(&self) -> TokenAmount {
        self.gas_premium.clone()
    }
}
