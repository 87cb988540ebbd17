// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod chain_store;
mod errors;
pub mod index;
pub mod message_store;
mod waiter;

pub use self::chain_store::*;
pub use self::errors::*;
pub use self::index::*;
pub use self::message_store::*;
pub use self::waiter::*;
