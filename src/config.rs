/// Typed runtime configuration. Built on the `config` crate, deserialized
/// into a concrete `Config` struct instead of queried key-by-key — the
/// option set here is small and fixed, so a typed struct is the natural
/// fit once the lookup stops being ad hoc.
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Livenet,
    Testnet,
    Regtest,
}

impl FromStr for Network {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "livenet" | "mainnet" => Ok(Network::Livenet),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(IndexError::Config(format!("unknown network '{other}'"))),
        }
    }
}

fn default_max_open_files() -> u32 {
    200
}

fn default_max_transaction_limit() -> u32 {
    5
}

fn default_publish_mempool_events() -> bool {
    false
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub datadir: PathBuf,
    pub network: Network,
    #[serde(default = "default_max_open_files")]
    pub max_open_files: u32,
    #[serde(default = "default_max_transaction_limit")]
    pub max_transaction_limit: u32,
    /// Whether mempool activity publishes to the `transaction` Event Bus
    /// topic. Confirmed-block transactions always publish regardless.
    #[serde(default = "default_publish_mempool_events")]
    pub publish_mempool_events: bool,
}

impl Config {
    /// Loads configuration from `config.toml` in the current directory,
    /// overridable by `ZENINDEX_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("ZENINDEX").separator("__"))
            .build()
            .map_err(|e| IndexError::Config(e.to_string()))?;

        raw.try_deserialize()
            .map_err(|e| IndexError::Config(e.to_string()))
    }

    /// Resolves the on-disk database path for the configured network.
    /// An unknown network is fatal, handled by `Network::from_str`
    /// before this ever runs.
    pub fn db_path(&self) -> PathBuf {
        match self.network {
            Network::Livenet => self.datadir.join("bitcore-node.db"),
            Network::Testnet => self.datadir.join("testnet3").join("bitcore-node.db"),
            Network::Regtest => self.datadir.join("regtest").join("bitcore-node.db"),
        }
    }
}
