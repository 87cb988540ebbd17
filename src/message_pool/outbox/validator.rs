// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::message::Message;
use crate::message_pool::errors::Error;
use crate::shim::econ::TokenAmount;
use crate::state_tree::ActorState;

/// Checks a local message before it is signed. `sender` is the sender actor
/// at the head, if it exists.
pub fn validate_outbound(msg: &impl Message, sender: Option<&ActorState>) -> Result<(), Error> {
    if msg.from() == msg.to() {
        return Err(Error::SelfSend);
    }
    if msg.value() < TokenAmount::default() {
        return Err(Error::NegativeValue);
    }
    if msg.gas_fee_cap().is_negative() || msg.gas_premium().is_negative() {
        return Err(Error::NegativeGasPrice);
    }
    let balance = sender.map(|a| a.balance.clone()).unwrap_or_default();
    if balance < msg.required_funds() {
        return Err(Error::NotEnoughFunds);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::unsigned_message;
    use rstest::rstest;

    #[rstest]
    #[case(200, 10, 5000, Ok(()))]
    #[case(100, 10, 5000, Err(Error::SelfSend))]
    #[case(200, -1, 5000, Err(Error::NegativeValue))]
    // gas_limit 1000 at a fee cap of 1 atto
    #[case(200, 10, 1009, Err(Error::NotEnoughFunds))]
    #[case(200, 10, 1010, Ok(()))]
    fn outbound_checks(
        #[case] to: u64,
        #[case] value: i64,
        #[case] balance: i64,
        #[case] expected: Result<(), Error>,
    ) {
        let msg = unsigned_message(100, to, 0, value);
        let sender = ActorState::new(TokenAmount::from_atto(balance), 0);
        assert_eq!(validate_outbound(&msg, Some(&sender)), expected);
    }

    #[test]
    fn negative_fee_cap_cannot_fund_a_send() {
        let mut msg = unsigned_message(100, 200, 0, 10);
        msg.gas_fee_cap = TokenAmount::from_atto(-1_000_000);
        assert_eq!(
            validate_outbound(&msg, Some(&ActorState::new(TokenAmount::from_atto(0), 0))),
            Err(Error::NegativeGasPrice)
        );
        msg.gas_fee_cap = TokenAmount::from_atto(1);
        msg.gas_premium = TokenAmount::from_atto(-1);
        assert_eq!(validate_outbound(&msg, None), Err(Error::NegativeGasPrice));
    }

    #[test]
    fn unknown_sender_has_no_funds() {
        let msg = unsigned_message(100, 200, 0, 0);
        assert_eq!(validate_outbound(&msg, None), Err(Error::NotEnoughFunds));
    }
}
