// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{family::Family, histogram::Histogram},
};
use std::sync::LazyLock;

pub static CONSENSUS_BLOCK_VALIDATION_TIME: LazyLock<Histogram> = LazyLock::new(|| {
    let metric = crate::metrics::default_histogram();
    crate::metrics::default_registry().register(
        "cns_block_validation_time",
        "Duration of routine which validate blocks in fil_cns",
        metric.clone(),
    );
    metric
});

pub static CONSENSUS_BLOCK_VALIDATION_TASKS_TIME: LazyLock<Family<TaskLabel, Histogram>> =
    LazyLock::new(|| {
        let metric = Family::<TaskLabel, Histogram>::new_with_constructor(
            crate::metrics::default_histogram,
        );
        crate::metrics::default_registry().register(
            "cns_block_validation_tasks_time",
            "Duration of subroutines inside cns block validation",
            metric.clone(),
        );
        metric
    });

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet, derive_more::Constructor)]
pub struct TaskLabel {
    task: &'static str,
}

pub mod values {
    use super::TaskLabel;

    pub const VALIDATE_MINER: TaskLabel = TaskLabel::new("validate_miner");
    pub const VALIDATE_WINNER_ELECTION: TaskLabel = TaskLabel::new("validate_winner_election");
    pub const VALIDATE_BLOCK_SIGNATURE: TaskLabel = TaskLabel::new("validate_block_signature");
    pub const VALIDATE_MESSAGES: TaskLabel = TaskLabel::new("validate_messages");
}
