// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cli_shared::cli::{CliOpts, ConfigPath};
use crate::cli_shared::logger;
use anyhow::Context;
use clap::Parser;
use std::ffi::OsString;
use std::time::Duration;
use tokio::runtime::Builder as RuntimeBuilder;
use tracing::info;

/// CLI structure generated when interacting with the node binary
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), author = env!("CARGO_PKG_AUTHORS"), version, about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[clap(flatten)]
    pub opts: CliOpts,
}

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> anyhow::Result<()>
where
    ArgT: Into<OsString> + Clone,
{
    // Capture Cli inputs
    let Cli { opts } = Cli::parse_from(args);

    let (path, cfg) = opts.to_config().context("Error parsing config")?;

    let _guards = logger::setup_logger(&cfg.log, cfg.client.log_dir.as_deref(), &opts.color);

    match &path {
        Some(ConfigPath::Env(path)) => {
            info!("FOREST_CONFIG_PATH loaded: {}", path.display())
        }
        Some(ConfigPath::Cli(path)) => {
            info!("Config loaded: {}", path.display())
        }
        None => info!("Using default {} config", cfg.chain.network),
    }

    let rt = RuntimeBuilder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let ret = rt.block_on(super::start_interruptable(opts, cfg));
    info!("Shutting down tokio...");
    rt.shutdown_timeout(Duration::from_secs_f32(0.5));
    info!("Node finished shutdown");
    ret
}
