//! The clock the route engine's tick loop runs on.

use async_trait::async_trait;
use std::time::Duration;

/// Time source for the engine's base tick.
///
/// Times are offsets from the moment the context started. The tick loop
/// waits for absolute deadlines (`start + k·period`) rather than sleeping a
/// fixed period after each tick, so time spent inside a tick does not push
/// every later tick back.
///
/// - `TokioContext` follows the wall clock
/// - `SimContext` (in `waytrail_sim`) is a virtual clock that jumps straight
///   to each deadline
#[async_trait]
pub trait TrailContext: Send + Sync + 'static {
    /// Time elapsed since the context started.
    fn now(&self) -> Duration;

    /// Waits until [`now`](Self::now) reaches `deadline`. A deadline already
    /// in the past returns at once.
    async fn sleep_until(&self, deadline: Duration);

    /// Waits `duration` past the current time.
    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }

    /// Seed that the run's random streams derive from, logged with each run.
    fn seed(&self) -> u64;
}
