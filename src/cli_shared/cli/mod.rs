// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod client;
mod config;

pub use self::{client::*, config::*};

use std::path::PathBuf;

use crate::utils::misc::LoggingColor;
use clap::Parser;

/// Environment variable pointing at the configuration file when `--config`
/// is not given.
pub const CONFIG_PATH_ENV: &str = "FOREST_CONFIG_PATH";

/// CLI options
#[derive(Default, Debug, Parser)]
#[command(name = "forest-node", version, about = "Filecoin node core")]
pub struct CliOpts {
    /// A TOML file containing relevant configurations
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Do not reach the network. Published messages stay local
    #[arg(long)]
    pub offline: bool,
    /// Directory for hourly rolling log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    /// Enable or disable colored logging in `stdout`
    #[arg(long, default_value = "auto")]
    pub color: LoggingColor,
}

impl CliOpts {
    /// Command line flags take precedence over the configuration file.
    pub fn to_config(&self) -> anyhow::Result<(Option<ConfigPath>, Config)> {
        let (path, mut cfg) = crate::cli_shared::read_config(self.config.as_ref())?;
        if self.offline {
            cfg.client.offline = true;
        }
        if let Some(log_dir) = &self.log_dir {
            cfg.client.log_dir = Some(log_dir.clone());
        }
        Ok((path, cfg))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Cli(PathBuf),
    Env(PathBuf),
}

impl ConfigPath {
    pub fn to_path_buf(&self) -> &PathBuf {
        match self {
            ConfigPath::Cli(path) | ConfigPath::Env(path) => path,
        }
    }
}

pub fn find_config_path(config: Option<&PathBuf>) -> Option<ConfigPath> {
    if let Some(s) = config {
        return Some(ConfigPath::Cli(s.to_owned()));
    }
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .map(ConfigPath::Env)
}
