//! Global token-bucket rate limiter for native endpoint probing.
//!
//! One bucket per scan: it starts full with `rps` tokens (the burst), a
//! background task replenishes one token every `1s/rps`, and the bucket is
//! capped one slot above the burst so idle periods cannot accumulate an
//! unbounded backlog. Each request blocks until a token is available.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Blocks until one request token is available.
    pub async fn acquire(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Creates a limiter replenishing `rps` tokens per second.
///
/// The background task stops when the returned limiter is dropped or the
/// scan's cancellation token fires.
pub fn new_rate_limiter(rps: usize, cancel: &CancellationToken) -> Arc<RateLimiter> {
    let rps = rps.max(1);
    let permits = Arc::new(Semaphore::new(rps));
    let shutdown = cancel.child_token();

    let limiter = Arc::new(RateLimiter {
        permits: Arc::clone(&permits),
        capacity: rps,
        shutdown: shutdown.clone(),
    });

    // Single-slot overflow: one token above the burst, excess is dropped.
    let cap = rps + 1;
    let mut ticker = interval(Duration::from_secs_f64(1.0 / rps as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if permits.available_permits() < cap {
                        permits.add_permits(1);
                    }
                }
                _ = shutdown.cancelled() => {
                    log::debug!("rate limiter replenishment task shutting down");
                    break;
                }
            }
        }
    });

    limiter
}
