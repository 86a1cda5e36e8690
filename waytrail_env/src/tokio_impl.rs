//! Wall-clock context for running routes in real time.

use crate::TrailContext;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Drives the engine on tokio's clock.
///
/// Deadlines are resolved against a single start instant, so a tick loop
/// on this context keeps its rate over long sessions instead of drifting
/// by the cost of each tick. Under `tokio::time::pause` the clock is
/// tokio's mocked one.
#[derive(Debug, Clone)]
pub struct TokioContext {
    start: Instant,
    seed: u64,
}

impl TokioContext {
    /// Unseeded context starting now.
    pub fn new() -> Self {
        Self::seeded(0)
    }

    /// Context starting now that reports `seed`, for live runs whose
    /// collaborators draw from seeded streams.
    pub fn seeded(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            seed,
        }
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrailContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep_until(&self, deadline: Duration) {
        tokio::time::sleep_until(self.start + deadline).await;
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
