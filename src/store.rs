use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::market::{LiveUpdate, RefreshMode, TrackedAsset};

/// Point-in-time copy of the store for the presentation layer.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub assets: Vec<TrackedAsset>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub favorites: Vec<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    assets: Vec<TrackedAsset>,
    loading: bool,
    error: Option<String>,
    last_refresh: Option<DateTime<Utc>>,
    favorites: Vec<String>,
}

/// Shared last-known view of every tracked asset. Refresh results and live
/// update batches are the only writers; both apply whole-object merges.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<StoreState>>,
}

impl SharedStore {
    pub fn new(favorites: Vec<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreState {
                favorites,
                ..StoreState::default()
            })),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.read().unwrap();
        Snapshot {
            assets: state.assets.clone(),
            loading: state.loading,
            error: state.error.clone(),
            last_refresh: state.last_refresh,
            favorites: state.favorites.clone(),
        }
    }

    pub fn favorites(&self) -> Vec<String> {
        self.inner.read().unwrap().favorites.clone()
    }

    /// Symbols currently tracked, in display order.
    pub fn tracked_symbols(&self) -> Vec<String> {
        let state = self.inner.read().unwrap();
        state.assets.iter().map(|a| a.symbol.clone()).collect()
    }

    pub fn get(&self, symbol: &str) -> Option<TrackedAsset> {
        let state = self.inner.read().unwrap();
        state
            .assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }

    /// Locate the tracked asset a feed message refers to, matching either the
    /// upstream identity or the translated symbol.
    pub fn find_for_feed(&self, asset_id: &str, symbol: &str) -> Option<TrackedAsset> {
        let state = self.inner.read().unwrap();
        state
            .assets
            .iter()
            .find(|a| {
                a.id.as_deref() == Some(asset_id) || a.symbol.eq_ignore_ascii_case(symbol)
            })
            .cloned()
    }

    /// The loading flag is only raised for foreground loads; background
    /// refreshes keep showing the previous data.
    pub fn begin_refresh(&self, show_loading: bool) {
        let mut state = self.inner.write().unwrap();
        if show_loading {
            state.loading = true;
        }
        state.error = None;
    }

    pub fn apply_refresh(&self, items: Vec<TrackedAsset>, mode: RefreshMode) {
        let mut state = self.inner.write().unwrap();
        state.loading = false;
        state.last_refresh = Some(Utc::now());

        match mode {
            RefreshMode::Full | RefreshMode::SearchAppend => {
                state.assets = items;
            }
            RefreshMode::Partial => {
                for item in items {
                    match state
                        .assets
                        .iter_mut()
                        .find(|a| a.symbol == item.symbol)
                    {
                        Some(existing) => *existing = item,
                        None => state.assets.push(item),
                    }
                }
            }
        }
    }

    pub fn fail_refresh<T: Into<String>>(&self, message: T) {
        let mut state = self.inner.write().unwrap();
        state.loading = false;
        state.error = Some(message.into());
    }

    /// Publish one tick's worth of coalesced live updates. Observers see a
    /// single consistent change instead of per-message churn.
    pub fn apply_live_updates(&self, updates: &HashMap<String, LiveUpdate>) -> usize {
        let mut state = self.inner.write().unwrap();
        let now = Utc::now();
        let mut applied = 0;
        for asset in state.assets.iter_mut() {
            if let Some(update) = updates.get(&asset.symbol) {
                asset.price = Some(update.price);
                asset.change_percent_24h = Some(update.price_delta_percent);
                asset.last_updated = Some(now);
                applied += 1;
            }
        }
        applied
    }

    /// Flip the favorite flag for a key, both in the favorites set and on the
    /// tracked asset itself. Returns the new set for external persistence.
    /// Does not trigger any refetch.
    pub fn toggle_favorite(&self, key: &str) -> Vec<String> {
        let mut state = self.inner.write().unwrap();
        if let Some(pos) = state.favorites.iter().position(|f| f == key) {
            state.favorites.remove(pos);
        } else {
            state.favorites.push(key.to_string());
        }
        for asset in state.assets.iter_mut() {
            if asset.symbol == key {
                asset.is_favorite = !asset.is_favorite;
            }
        }
        state.favorites.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, price: f64) -> TrackedAsset {
        let mut asset = TrackedAsset::not_found(symbol, false);
        asset.error = None;
        asset.price = Some(price);
        asset
    }

    #[test]
    fn full_refresh_replaces_collection() {
        let store = SharedStore::new(Vec::new());
        store.apply_refresh(vec![asset("BTC", 1.0), asset("ETH", 2.0)], RefreshMode::Full);
        store.apply_refresh(vec![asset("SOL", 3.0)], RefreshMode::Full);
        assert_eq!(store.tracked_symbols(), vec!["SOL"]);
    }

    #[test]
    fn full_refresh_is_idempotent() {
        let store = SharedStore::new(Vec::new());
        let items = vec![asset("BTC", 1.0), asset("ETH", 2.0)];
        store.apply_refresh(items.clone(), RefreshMode::Full);
        store.apply_refresh(items, RefreshMode::Full);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.assets.len(), 2);
        assert!(snapshot.assets.iter().all(|a| !a.stale));
    }

    #[test]
    fn partial_refresh_preserves_untouched_items() {
        let store = SharedStore::new(Vec::new());
        store.apply_refresh(
            vec![asset("BTC", 1.0), asset("ETH", 2.0)],
            RefreshMode::Full,
        );
        store.apply_refresh(
            vec![asset("BTC", 9.0), asset("ADA", 4.0)],
            RefreshMode::Partial,
        );

        let snapshot = store.snapshot();
        assert_eq!(snapshot.assets.len(), 3);
        assert_eq!(store.get("BTC").unwrap().price, Some(9.0));
        assert_eq!(store.get("ETH").unwrap().price, Some(2.0));
        assert_eq!(snapshot.assets.last().unwrap().symbol, "ADA");
    }

    #[test]
    fn live_updates_touch_only_known_symbols() {
        let store = SharedStore::new(Vec::new());
        store.apply_refresh(vec![asset("BTC", 100.0)], RefreshMode::Full);

        let mut updates = HashMap::new();
        updates.insert(
            "BTC".to_string(),
            LiveUpdate {
                price: 105.0,
                price_delta: 5.0,
                price_delta_percent: 5.0,
            },
        );
        updates.insert(
            "ETH".to_string(),
            LiveUpdate {
                price: 1.0,
                price_delta: 0.0,
                price_delta_percent: 0.0,
            },
        );

        assert_eq!(store.apply_live_updates(&updates), 1);
        let btc = store.get("BTC").unwrap();
        assert_eq!(btc.price, Some(105.0));
        assert_eq!(btc.change_percent_24h, Some(5.0));
        assert!(btc.last_updated.is_some());
    }

    #[test]
    fn toggle_favorite_round_trips() {
        let store = SharedStore::new(vec!["ETH".to_string()]);
        store.apply_refresh(vec![asset("BTC", 1.0)], RefreshMode::Full);

        let favorites = store.toggle_favorite("BTC");
        assert_eq!(favorites, vec!["ETH", "BTC"]);
        assert!(store.get("BTC").unwrap().is_favorite);

        let favorites = store.toggle_favorite("BTC");
        assert_eq!(favorites, vec!["ETH"]);
        assert!(!store.get("BTC").unwrap().is_favorite);
    }

    #[test]
    fn loading_flag_only_for_foreground_loads() {
        let store = SharedStore::new(Vec::new());
        store.begin_refresh(false);
        assert!(!store.snapshot().loading);
        store.begin_refresh(true);
        assert!(store.snapshot().loading);
        store.fail_refresh("upstream down");
        let snapshot = store.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error.as_deref(), Some("upstream down"));
    }
}
