use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::market::{symbol_for_asset, LiveUpdate};
use crate::store::SharedStore;

/// Raw inbound feed messages, pushed by the socket reader and drained on a
/// fixed cadence. Never parsed on the socket's delivery path.
pub type MessageBuffer = Arc<Mutex<Vec<String>>>;

pub fn message_buffer() -> MessageBuffer {
    Arc::new(Mutex::new(Vec::new()))
}

/// Drains the message buffer once per tick, coalescing all buffered messages
/// into one store publication.
pub struct BatchProcessor {
    buffer: MessageBuffer,
    store: SharedStore,
}

impl BatchProcessor {
    pub fn new(buffer: MessageBuffer, store: SharedStore) -> Self {
        Self { buffer, store }
    }

    /// One tick. Messages arriving while this runs land in the next tick;
    /// within a tick the last value per symbol wins. Returns how many tracked
    /// assets were updated.
    pub fn drain(&self) -> usize {
        let messages = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if messages.is_empty() {
            return 0;
        }

        let mut updates: HashMap<String, LiveUpdate> = HashMap::new();
        for raw in &messages {
            let parsed: HashMap<String, Value> = match serde_json::from_str(raw) {
                Ok(map) => map,
                Err(err) => {
                    log::warn!("skipping malformed feed message: {}", err);
                    continue;
                }
            };

            for (asset_id, value) in parsed {
                let symbol = symbol_for_asset(&asset_id);
                let Some(price) = value_to_price(&value) else {
                    continue;
                };
                let Some(existing) = self.store.find_for_feed(&asset_id, &symbol) else {
                    continue;
                };

                let old_price = existing.price.unwrap_or(0.0);
                let price_delta = price - old_price;
                let price_delta_percent = if old_price != 0.0 {
                    price_delta / old_price * 100.0
                } else {
                    0.0
                };
                updates.insert(
                    existing.symbol,
                    LiveUpdate {
                        price,
                        price_delta,
                        price_delta_percent,
                    },
                );
            }
        }

        if updates.is_empty() {
            return 0;
        }
        let applied = self.store.apply_live_updates(&updates);
        log::debug!(
            "batch tick: {} messages coalesced into {} updates, {} applied",
            messages.len(),
            updates.len(),
            applied
        );
        applied
    }

    /// Run the drain on a fixed cadence until the returned handle is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.drain();
            }
        })
    }
}

fn value_to_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    if price.is_finite() && price != 0.0 {
        Some(price)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{RefreshMode, TrackedAsset};

    fn store_with(symbol: &str, id: &str, price: Option<f64>) -> SharedStore {
        let mut asset = TrackedAsset::not_found(symbol, false);
        asset.error = None;
        asset.id = Some(id.to_string());
        asset.price = price;
        let store = SharedStore::new(Vec::new());
        store.apply_refresh(vec![asset], RefreshMode::Full);
        store
    }

    fn processor(store: &SharedStore) -> BatchProcessor {
        BatchProcessor::new(message_buffer(), store.clone())
    }

    fn push(processor: &BatchProcessor, raw: &str) {
        processor.buffer.lock().unwrap().push(raw.to_string());
    }

    #[test]
    fn last_value_wins_within_one_tick() {
        let store = store_with("BTC", "bitcoin", Some(100.0));
        let processor = processor(&store);
        push(&processor, r#"{"bitcoin":"100"}"#);
        push(&processor, r#"{"bitcoin":"105"}"#);

        assert_eq!(processor.drain(), 1);

        let btc = store.get("BTC").unwrap();
        assert_eq!(btc.price, Some(105.0));
        // 105 against the prior known 100: +5%.
        assert_eq!(btc.change_percent_24h, Some(5.0));
    }

    #[test]
    fn malformed_messages_are_skipped_not_fatal() {
        let store = store_with("BTC", "bitcoin", Some(100.0));
        let processor = processor(&store);
        push(&processor, "not json at all");
        push(&processor, r#"{"bitcoin":"110"}"#);

        assert_eq!(processor.drain(), 1);
        assert_eq!(store.get("BTC").unwrap().price, Some(110.0));
    }

    #[test]
    fn zero_prior_price_guards_the_percent() {
        let store = store_with("BTC", "bitcoin", None);
        let processor = processor(&store);
        push(&processor, r#"{"bitcoin":"50"}"#);

        assert_eq!(processor.drain(), 1);
        let btc = store.get("BTC").unwrap();
        assert_eq!(btc.price, Some(50.0));
        assert_eq!(btc.change_percent_24h, Some(0.0));
    }

    #[test]
    fn unknown_assets_are_ignored() {
        let store = store_with("BTC", "bitcoin", Some(100.0));
        let processor = processor(&store);
        push(&processor, r#"{"monero":"150"}"#);

        assert_eq!(processor.drain(), 0);
        assert_eq!(store.get("BTC").unwrap().price, Some(100.0));
    }

    #[test]
    fn drain_empties_the_buffer_exactly_once() {
        let store = store_with("BTC", "bitcoin", Some(100.0));
        let processor = processor(&store);
        push(&processor, r#"{"bitcoin":"101"}"#);

        assert_eq!(processor.drain(), 1);
        assert!(processor.buffer.lock().unwrap().is_empty());
        // Nothing left to double-process.
        assert_eq!(processor.drain(), 0);
    }

    #[test]
    fn feed_identity_fallback_matches_by_symbol() {
        // Asset tracked without an id yet still matches via the uppercase
        // fallback translation.
        let store = store_with("MONERO", "", Some(10.0));
        let processor = processor(&store);
        push(&processor, r#"{"monero":"12"}"#);

        assert_eq!(processor.drain(), 1);
        assert_eq!(store.get("MONERO").unwrap().price, Some(12.0));
    }
}
