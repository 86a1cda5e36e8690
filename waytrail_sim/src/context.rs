//! Simulation context implementing TrailContext for deterministic testing.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use waytrail_env::TrailContext;

/// Simulation context backed by a virtual clock and a master seed.
///
/// - The clock only moves when advanced explicitly or through `sleep`
/// - Every random stream in a run is derived from the master seed
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap_or_else(|p| p.into_inner());
        *time += duration.as_nanos() as u64;
    }

    /// Moves virtual time forward to `deadline`; never moves it back.
    pub fn advance_to(&self, deadline: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap_or_else(|p| p.into_inner());
        *time = (*time).max(deadline.as_nanos() as u64);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Derives an independent RNG stream for one subsystem.
    ///
    /// Same seed and extension always give the same stream.
    pub fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

#[async_trait]
impl TrailContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep_until(&self, deadline: Duration) {
        // Waiting is how simulated time passes; every task waiting on the
        // same deadline moves the clock to the same place
        self.advance_to(deadline);
        tokio::task::yield_now().await;
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
