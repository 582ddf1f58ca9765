use crate::error::Result;

pub mod api;
pub mod queue;
pub mod retry;

pub use api::MarketApi;
pub use queue::RequestQueue;
pub use retry::RetryPolicy;

pub type FetchResult<T> = Result<T>;

#[inline]
pub fn ensure_concurrency_limit(limit: usize) -> usize {
    limit.max(1)
}
