use std::sync::{Arc, Mutex};

use reqwest::Client;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::{MarketApi, RequestQueue, RetryPolicy};
use crate::live::{BatchProcessor, ConnectionManager, ConnectionState, FeedHandle};
use crate::notice::{Notice, NoticeSender};
use crate::refresh::{RefreshOutcome, RefreshRequest, Refresher};
use crate::storage::{FavoritesStore, CRYPTO_FAVORITES_KEY};
use crate::store::{SharedStore, Snapshot};

/// One logical client session: wires the store, the rate-limited fetch
/// pipeline, and the live feed together, and exposes the inbound surface the
/// presentation layer calls into.
pub struct Session {
    config: Config,
    store: SharedStore,
    refresher: Arc<Refresher>,
    feed: FeedHandle,
    feed_task: Mutex<Option<JoinHandle<()>>>,
    batch_task: Mutex<Option<JoinHandle<()>>>,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
    favorites: FavoritesStore,
    notices: NoticeSender,
}

impl Session {
    /// Construct the engine and return it with the notification stream the
    /// toast collaborator should consume.
    pub fn new(config: Config) -> (Self, UnboundedReceiver<Notice>) {
        let favorites = FavoritesStore::new(config.data_dir.clone());
        let store = SharedStore::new(favorites.load(CRYPTO_FAVORITES_KEY));
        let (notices, notices_rx) = NoticeSender::channel();

        let queue = Arc::new(RequestQueue::new(
            config.queue.concurrency,
            config.queue.interval(),
        ));
        let retry = RetryPolicy::new(config.api.max_retries, config.api.initial_delay());
        let api = Arc::new(MarketApi::new(
            Client::new(),
            config.api.base_url.clone(),
            queue,
            retry,
        ));
        let refresher = Arc::new(Refresher::new(
            api,
            store.clone(),
            config.default_coins.clone(),
        ));

        let buffer = crate::live::batch::message_buffer();
        let batch_task = BatchProcessor::new(buffer.clone(), store.clone())
            .spawn(config.feed.batch_interval());
        let (feed, feed_task) = ConnectionManager::spawn(
            config.feed.clone(),
            store.clone(),
            buffer,
            notices.clone(),
        );

        let session = Self {
            config,
            store,
            refresher,
            feed,
            feed_task: Mutex::new(Some(feed_task)),
            batch_task: Mutex::new(Some(batch_task)),
            auto_refresh: Mutex::new(None),
            favorites,
            notices,
        };
        (session, notices_rx)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Foreground load of the default set plus favorites. No toasts; the
    /// loading flag covers the UI.
    pub async fn load_initial(&self) -> Result<RefreshOutcome> {
        self.refresher.refresh(&RefreshRequest::initial()).await
    }

    /// Background refresh of everything currently tracked, with a summary
    /// notification and a feed reconnect when the socket is down.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        match self.refresher.refresh(&RefreshRequest::background()).await {
            Ok(outcome) => {
                if outcome.failed.is_empty() {
                    self.notices.success(
                        "Crypto data updated",
                        "Successfully refreshed cryptocurrency data",
                    );
                } else {
                    self.notices.error(
                        "Some updates failed",
                        format!("Could not refresh: {}", outcome.failed.join(", ")),
                    );
                }
                // Reconnect only when the feed is actually down; a healthy
                // socket keeps its current subscription.
                if self.feed.state() != ConnectionState::Connected {
                    self.feed.connect();
                }
                Ok(outcome)
            }
            Err(err) => {
                self.notices
                    .error("Refresh failed", "Could not update cryptocurrency data");
                Err(err)
            }
        }
    }

    /// Explicit user search: the key joins the tracked set, ordered first,
    /// and the feed resubscribes to pick it up.
    pub async fn search(&self, key: &str) -> Result<RefreshOutcome> {
        let outcome = self.refresher.refresh(&RefreshRequest::search(key)).await?;

        let searched = outcome
            .assets
            .iter()
            .find(|a| a.symbol.eq_ignore_ascii_case(key));
        match searched {
            Some(asset) if asset.error.is_some() => {
                self.notices
                    .error("Coin not found", format!("Could not find data for {}", key));
            }
            Some(asset) => {
                self.notices.success(
                    "Coin added",
                    format!("Added {} to your crypto dashboard", asset.name),
                );
                self.feed.connect();
            }
            None => {
                self.notices.error(
                    "Cryptocurrency not found",
                    format!("Could not find cryptocurrency matching \"{}\"", key),
                );
            }
        }
        Ok(outcome)
    }

    /// Flip a favorite and persist the new set. Triggers no refetch.
    pub fn toggle_favorite(&self, key: &str) -> Result<()> {
        let favorites = self.store.toggle_favorite(key);
        self.favorites.save(CRYPTO_FAVORITES_KEY, &favorites)?;
        Ok(())
    }

    pub fn connect(&self) {
        self.feed.connect();
    }

    pub fn disconnect(&self) {
        self.feed.disconnect();
    }

    /// The host regained connectivity; reconnect immediately.
    pub fn go_online(&self) {
        self.feed.went_online();
    }

    pub fn go_offline(&self) {
        self.feed.went_offline();
    }

    /// Poll for background refreshes on the configured cadence. Replaces any
    /// previous poll task rather than stacking another.
    pub fn spawn_auto_refresh(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let interval = self.config.refresh_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the immediate first tick
            loop {
                ticker.tick().await;
                if let Err(err) = session.refresh().await {
                    log::warn!("scheduled refresh failed: {}", err);
                }
            }
        });
        if let Some(previous) = self.auto_refresh.lock().unwrap().replace(task) {
            previous.abort();
        }
    }

    /// Stop future scheduling: timers cleared, socket closed. Already
    /// dispatched requests run to completion and their results are dropped.
    pub async fn shutdown(&self) {
        if let Some(task) = self.auto_refresh.lock().unwrap().take() {
            task.abort();
        }
        if let Some(task) = self.batch_task.lock().unwrap().take() {
            task.abort();
        }
        self.feed.shutdown();
        let feed_task = self.feed_task.lock().unwrap().take();
        if let Some(task) = feed_task {
            let _ = task.await;
        }
    }
}
