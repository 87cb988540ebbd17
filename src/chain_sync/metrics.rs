// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use prometheus_client::metrics::{counter::Counter, gauge::Gauge, histogram::Histogram};
use std::sync::LazyLock;

pub static TIPSET_PROCESSING_TIME: LazyLock<Histogram> = LazyLock::new(|| {
    let metric = crate::metrics::default_histogram();
    crate::metrics::default_registry().register(
        "tipset_processing_time",
        "Duration of routine which processes Tipsets to include them in the store",
        metric.clone(),
    );
    metric
});
pub static BLOCK_VALIDATION_TIME: LazyLock<Histogram> = LazyLock::new(|| {
    let metric = crate::metrics::default_histogram();
    crate::metrics::default_registry().register(
        "block_validation_time",
        "Duration of routine which validate blocks with no cache hit",
        metric.clone(),
    );
    metric
});
pub static INVALID_TIPSET_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    crate::metrics::default_registry().register(
        "invalid_tipset_total",
        "Total number of invalid tipsets received from peers",
        metric.clone(),
    );
    metric
});
pub static HEAD_EPOCH: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    crate::metrics::default_registry().register(
        "head_epoch",
        "Latest epoch synchronized to the node",
        metric.clone(),
    );
    metric
});
