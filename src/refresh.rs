use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::error::AppError;
use crate::fetch::api::best_match;
use crate::fetch::MarketApi;
use crate::market::{RefreshMode, TrackedAsset};
use crate::store::SharedStore;

/// What triggered a refresh and which symbols it should cover.
#[derive(Debug, Clone, Default)]
pub struct RefreshRequest {
    pub searched: Option<String>,
    pub refresh_only: bool,
}

impl RefreshRequest {
    /// Foreground load of the default set.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Background poll covering everything currently tracked.
    pub fn background() -> Self {
        Self {
            refresh_only: true,
            ..Self::default()
        }
    }

    /// Explicit user search for one symbol.
    pub fn search<T: Into<String>>(symbol: T) -> Self {
        Self {
            searched: Some(symbol.into()),
            refresh_only: false,
        }
    }
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub assets: Vec<TrackedAsset>,
    /// Display names of the items whose refresh failed.
    pub failed: Vec<String>,
}

/// Fans out per-symbol fetch pipelines through the shared queue, merges the
/// results (including stale fallback) and republishes one consistent snapshot.
pub struct Refresher {
    api: Arc<MarketApi>,
    store: SharedStore,
    default_coins: Vec<String>,
}

impl Refresher {
    pub fn new(api: Arc<MarketApi>, store: SharedStore, default_coins: Vec<String>) -> Self {
        Self {
            api,
            store,
            default_coins,
        }
    }

    pub async fn refresh(&self, request: &RefreshRequest) -> crate::Result<RefreshOutcome> {
        let favorites = self.store.favorites();
        let mode = self.mode(request);
        let targets = self.target_symbols(request, mode, &favorites);

        self.store.begin_refresh(!request.refresh_only);

        let pipelines = targets
            .iter()
            .map(|symbol| self.fetch_symbol(symbol, &favorites));
        let mut assets: Vec<TrackedAsset> = join_all(pipelines).await;

        // An explicit search floats its result to the front of the view.
        if let Some(searched) = &request.searched {
            let searched = searched.to_uppercase();
            assets.sort_by_key(|a| a.symbol != searched);
        }

        let failed: Vec<String> = assets
            .iter()
            .filter(|a| a.error.is_some())
            .map(|a| a.name.clone())
            .collect();

        self.store.apply_refresh(assets.clone(), mode);
        Ok(RefreshOutcome { assets, failed })
    }

    fn mode(&self, request: &RefreshRequest) -> RefreshMode {
        if request.refresh_only {
            return RefreshMode::Partial;
        }
        match &request.searched {
            Some(symbol) if !self.is_default(symbol) => RefreshMode::SearchAppend,
            _ => RefreshMode::Full,
        }
    }

    fn is_default(&self, symbol: &str) -> bool {
        self.default_coins
            .iter()
            .any(|c| c.eq_ignore_ascii_case(symbol))
    }

    fn target_symbols(
        &self,
        request: &RefreshRequest,
        mode: RefreshMode,
        favorites: &[String],
    ) -> Vec<String> {
        let mut targets: Vec<String> = match mode {
            RefreshMode::Partial => self.store.tracked_symbols(),
            RefreshMode::SearchAppend => {
                let searched = request
                    .searched
                    .as_deref()
                    .unwrap_or_default()
                    .to_uppercase();
                std::iter::once(searched)
                    .chain(self.default_coins.iter().cloned())
                    .collect()
            }
            RefreshMode::Full => self.default_coins.clone(),
        };

        for favorite in favorites {
            if !targets.contains(favorite) {
                targets.push(favorite.clone());
            }
        }

        let mut seen = HashSet::new();
        targets.retain(|symbol| seen.insert(symbol.clone()));
        targets
    }

    /// One per-item pipeline. Failures are contained here: the result is
    /// always a tracked item, possibly stale or error-flagged, and sibling
    /// pipelines are unaffected.
    async fn fetch_symbol(&self, symbol: &str, favorites: &[String]) -> TrackedAsset {
        let is_favorite = favorites.iter().any(|f| f.eq_ignore_ascii_case(symbol));
        match self.fetch_pipeline(symbol, is_favorite).await {
            Ok(asset) => asset,
            Err(err) if err.is_not_found() => TrackedAsset::not_found(symbol, is_favorite),
            Err(err) => {
                log::warn!("refresh failed for {}: {}", symbol, err);
                match self.store.get(symbol) {
                    Some(existing) => TrackedAsset::stale_fallback(existing, &err, is_favorite),
                    None => TrackedAsset::fetch_failed(symbol, &err, is_favorite),
                }
            }
        }
    }

    /// Search, then detail, then history — in order for this item, but
    /// interleaved with other items' steps under the shared queue's pacing.
    async fn fetch_pipeline(
        &self,
        symbol: &str,
        is_favorite: bool,
    ) -> crate::Result<TrackedAsset> {
        let candidates = self.api.search(symbol).await?;
        let Some(candidate) = best_match(&candidates, symbol) else {
            return Err(AppError::NotFound(format!("cryptocurrency {}", symbol)));
        };
        let id = candidate.id.clone();

        let detail = self.api.detail(&id).await?;
        let history = self.api.history(&id).await?;

        Ok(detail.into_tracked(Some(history), is_favorite))
    }
}
