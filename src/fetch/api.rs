use std::sync::Arc;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::AppError;
use crate::fetch::{FetchResult, RequestQueue, RetryPolicy};
use crate::market::{PriceHistory, TrackedAsset};

/// One asset row as the quota-limited API reports it. Numeric fields arrive
/// as strings and are parsed leniently on conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    pub id: String,
    pub symbol: String,
    pub name: String,
    price_usd: Option<String>,
    change_percent24_hr: Option<String>,
    market_cap_usd: Option<String>,
    volume_usd24_hr: Option<String>,
    supply: Option<String>,
    max_supply: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetListPayload {
    data: Vec<AssetPayload>,
}

#[derive(Debug, Deserialize)]
struct AssetDetailPayload {
    data: AssetPayload,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    data: Vec<HistoryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPoint {
    price_usd: String,
    time: i64,
}

impl AssetPayload {
    pub fn into_tracked(
        self,
        history: Option<PriceHistory>,
        is_favorite: bool,
    ) -> TrackedAsset {
        let logo = format!(
            "https://assets.coincap.io/assets/icons/{}@2x.png",
            self.symbol.to_lowercase()
        );
        TrackedAsset {
            id: Some(self.id),
            symbol: self.symbol,
            name: self.name,
            price: parse_number(self.price_usd.as_deref()),
            change_percent_24h: parse_number(self.change_percent24_hr.as_deref()),
            market_cap: parse_number(self.market_cap_usd.as_deref()),
            volume_24h: parse_number(self.volume_usd24_hr.as_deref()),
            supply: parse_number(self.supply.as_deref()),
            max_supply: parse_number(self.max_supply.as_deref()),
            logo: Some(logo),
            price_history: history,
            is_favorite,
            stale: false,
            error: None,
            last_updated: Some(Utc::now()),
        }
    }
}

/// Prefer the exact symbol match; otherwise settle for the closest candidate.
pub fn best_match<'a>(candidates: &'a [AssetPayload], symbol: &str) -> Option<&'a AssetPayload> {
    candidates
        .iter()
        .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
        .or_else(|| candidates.first())
}

/// REST client for the search / detail / history endpoints. Every call runs
/// inside the shared queue (global rate pacing) and under the retry policy.
pub struct MarketApi {
    client: Client,
    base_url: String,
    queue: Arc<RequestQueue>,
    retry: RetryPolicy,
}

impl MarketApi {
    pub fn new(
        client: Client,
        base_url: String,
        queue: Arc<RequestQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            queue,
            retry,
        }
    }

    pub async fn search(&self, symbol: &str) -> FetchResult<Vec<AssetPayload>> {
        let url = format!(
            "{}/assets?search={}",
            self.base_url,
            symbol.to_lowercase()
        );
        let payload: AssetListPayload = self.get_json(url).await?;
        Ok(payload.data)
    }

    pub async fn detail(&self, id: &str) -> FetchResult<AssetPayload> {
        let url = format!("{}/assets/{}", self.base_url, id);
        let payload: AssetDetailPayload = self.get_json(url).await?;
        Ok(payload.data)
    }

    /// Seven daily points, mapped into chart-ready series and labels.
    pub async fn history(&self, id: &str) -> FetchResult<PriceHistory> {
        let url = format!(
            "{}/assets/{}/history?interval=d1&limit=7",
            self.base_url, id
        );
        let payload: HistoryPayload = self.get_json(url).await?;

        let mut prices = Vec::with_capacity(payload.data.len());
        let mut labels = Vec::with_capacity(payload.data.len());
        for point in payload.data {
            let Some(price) = parse_number(Some(&point.price_usd)) else {
                continue;
            };
            prices.push(price);
            labels.push(history_label(point.time));
        }
        Ok(PriceHistory { prices, labels })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> FetchResult<T> {
        let client = self.client.clone();
        let retry = self.retry;
        self.queue
            .run(move || async move {
                retry
                    .execute(|| {
                        let client = client.clone();
                        let url = url.clone();
                        async move {
                            let response = client.get(&url).send().await?;
                            let status = response.status();
                            if !status.is_success() {
                                return Err(AppError::Status(status));
                            }
                            Ok(response.json::<T>().await?)
                        }
                    })
                    .await
            })
            .await
    }
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

fn history_label(epoch_ms: i64) -> String {
    match Utc.timestamp_millis_opt(epoch_ms).single() {
        Some(timestamp) => timestamp.format("%b %-d").to_string(),
        None => String::new(),
    }
}
