use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};

use crate::fetch::{ensure_concurrency_limit, FetchResult};

struct Pacing {
    last_dispatch: Option<Instant>,
}

/// Serializes asynchronous tasks under a global concurrency cap and a minimum
/// inter-dispatch interval. Many independent fetch pipelines share one of
/// these so the upstream API's quota is respected across all of them.
///
/// Guarantees: dispatch order is FIFO (fair permit and lock acquisition), no
/// more than `concurrency` tasks run at once, and any two dispatch *starts*
/// are at least `interval` apart. One task failing never blocks the rest.
pub struct RequestQueue {
    semaphore: Arc<Semaphore>,
    pacing: Mutex<Pacing>,
    interval: Duration,
    in_flight: AtomicUsize,
}

impl RequestQueue {
    pub fn new(concurrency: usize, interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(ensure_concurrency_limit(concurrency))),
            pacing: Mutex::new(Pacing {
                last_dispatch: None,
            }),
            interval,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Tasks currently executing (excludes those still waiting for a slot).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn run<T, F, Fut>(&self, task: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("request queue semaphore closed");

        // The pacing lock is held across the wait so dispatch starts stay
        // spaced even when a concurrency slot is free.
        {
            let mut pacing = self.pacing.lock().await;
            if let Some(last) = pacing.last_dispatch {
                let elapsed = last.elapsed();
                if elapsed < self.interval {
                    sleep(self.interval - elapsed).await;
                }
            }
            pacing.last_dispatch = Some(Instant::now());
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = task().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
