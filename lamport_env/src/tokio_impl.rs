//! Production implementation of NodeContext using Tokio.

use crate::NodeContext;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// Production context backed by Tokio and OS entropy.
///
/// This is the "real" implementation used when nodes talk over sockets.
/// Time comes from the system clock, randomness from an `StdRng` seeded
/// either from the OS or from an explicit seed.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Branch-selection RNG
    rng: Mutex<StdRng>,
}

impl TokioContext {
    /// Creates a new TokioContext seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a context whose random rolls are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn roll(&self, low: u32, high: u32) -> u32 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(low..=high)
    }
}
