// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

use crate::cli_shared::cli::LogConfig;
use crate::utils::misc::LoggingColor;

/// Keeps the file writer flushing. Dropping it loses buffered lines.
#[derive(Default)]
pub struct Guards {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber: a console layer and, when `log_dir` is
/// set, an hourly rolling file layer.
pub fn setup_logger(log: &LogConfig, log_dir: Option<&Path>, color: &LoggingColor) -> Guards {
    let mut guards = Guards::default();
    let mut layers: Vec<Box<dyn tracing_subscriber::layer::Layer<Registry> + Send + Sync>> =
        // console logger
        vec![Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(color.coloring_enabled())
                .with_filter(get_env_filter(config_env_filter(log))),
        )];

    // file logger
    if let Some(log_dir) = log_dir {
        let file_appender = tracing_appender::rolling::hourly(log_dir, "forest-node.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        guards._file = Some(guard);
        layers.push(Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(get_env_filter(config_env_filter(log))),
        ));
    }

    if tracing_subscriber::registry().with(layers).try_init().is_err() {
        tracing::debug!("global logger already installed");
    }
    guards
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or a default
/// - see [`config_env_filter`]
fn get_env_filter(def: EnvFilter) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => def,
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

/// Filter from the `[log]` section. Falls back to `info` on directives that
/// do not parse.
fn config_env_filter(log: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(log.to_filter_string()).unwrap_or_else(|e| {
        eprintln!("invalid log filters in configuration: {e}");
        EnvFilter::new("info")
    })
}
