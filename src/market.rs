use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Upstream asset identities mapped to the ticker symbols we track.
const SYMBOL_MAP: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("solana", "SOL"),
    ("cardano", "ADA"),
    ("dogecoin", "DOGE"),
    ("polkadot", "DOT"),
    ("ripple", "XRP"),
];

/// Translate a feed asset identity (e.g. "bitcoin") to its tracked symbol.
/// Unknown identities fall back to the uppercased raw name.
pub fn symbol_for_asset(asset_id: &str) -> String {
    SYMBOL_MAP
        .iter()
        .find(|(id, _)| *id == asset_id)
        .map(|(_, symbol)| symbol.to_string())
        .unwrap_or_else(|| asset_id.to_uppercase())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceHistory {
    pub prices: Vec<f64>,
    pub labels: Vec<String>,
}

/// Last-known view of one tracked asset. Created on the first fetch attempt
/// (successful or not), updated in place afterwards, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedAsset {
    pub id: Option<String>,
    pub symbol: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_percent_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub logo: Option<String>,
    pub price_history: Option<PriceHistory>,
    pub is_favorite: bool,
    pub stale: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TrackedAsset {
    fn placeholder(symbol: &str, is_favorite: bool) -> Self {
        let symbol = symbol.to_uppercase();
        Self {
            id: None,
            name: symbol.clone(),
            symbol,
            price: None,
            change_percent_24h: None,
            market_cap: None,
            volume_24h: None,
            supply: None,
            max_supply: None,
            logo: None,
            price_history: None,
            is_favorite,
            stale: false,
            error: None,
            last_updated: None,
        }
    }

    /// Identity resolution produced no candidates; terminal, nothing retried.
    pub fn not_found(symbol: &str, is_favorite: bool) -> Self {
        Self {
            error: Some("Cryptocurrency not found".to_string()),
            ..Self::placeholder(symbol, is_favorite)
        }
    }

    /// A fetch failed and there is no prior data to fall back on.
    pub fn fetch_failed(symbol: &str, err: &AppError, is_favorite: bool) -> Self {
        Self {
            error: Some(format!("Failed to fetch data: {}", err)),
            ..Self::placeholder(symbol, is_favorite)
        }
    }

    /// A refresh failed but we still hold last-known values: keep them,
    /// mark the entry stale so the UI can say so.
    pub fn stale_fallback(existing: TrackedAsset, err: &AppError, is_favorite: bool) -> Self {
        Self {
            error: Some(format!("Failed to update: {}", err)),
            stale: true,
            is_favorite,
            ..existing
        }
    }
}

/// Coalesced per-symbol price update produced by one batch tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveUpdate {
    pub price: f64,
    pub price_delta: f64,
    pub price_delta_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Replace the entire tracked collection.
    Full,
    /// Update matching symbols in place, append unseen ones.
    Partial,
    /// A searched symbol joins the default set; collection is replaced.
    SearchAppend,
}
