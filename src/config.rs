use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coincap.io/v2".to_string(),
            max_retries: 4,
            initial_delay_ms: 5_000,
        }
    }
}

impl ApiConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum simultaneously in-flight requests against the API.
    pub concurrency: usize,
    /// Minimum spacing between request dispatch starts.
    pub interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            interval_ms: 500,
        }
    }
}

impl QueueConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub ws_url: String,
    pub reconnect_delay_ms: u64,
    pub batch_interval_ms: u64,
    /// How many assets are granted a live subscription slot.
    pub subscription_limit: usize,
    /// Symbols that keep a feed slot ahead of everything but favorites.
    pub default_symbols: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.coincap.io/prices".to_string(),
            reconnect_delay_ms: 30_000,
            batch_interval_ms: 2_000,
            subscription_limit: 5,
            default_symbols: symbols(&["BTC", "ETH", "SOL", "ADA", "DOGE"]),
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub queue: QueueConfig,
    pub feed: FeedConfig,
    /// Background poll cadence for full data refreshes.
    pub refresh_interval_ms: u64,
    /// Symbols fetched when no search or prior state narrows the set.
    pub default_coins: Vec<String>,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            queue: QueueConfig::default(),
            feed: FeedConfig::default(),
            refresh_interval_ms: 300_000,
            default_coins: symbols(&["BTC", "ETH", "SOL"]),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load overrides from a JSON file; absent fields fall back to builtins.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
