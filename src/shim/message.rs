// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use fvm_shared4::METHOD_SEND;
pub use fvm_shared4::MethodNum;
pub use fvm_shared4::error::ExitCode;
pub use fvm_shared4::message::Message;
