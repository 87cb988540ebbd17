// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Thin layer over the `fvm_shared` primitives used across the node.

pub mod address;
pub mod clock;
pub mod crypto;
pub mod econ;
pub mod message;
