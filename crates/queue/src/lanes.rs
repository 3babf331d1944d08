//! Keyed concurrency limiter.
//!
//! Each partition key (a conversation ID) maps to one lane with
//! concurrency 1. Jobs sharing a key therefore execute strictly
//! one-at-a-time in enqueue order, while jobs on different keys run
//! concurrently. Lanes are created lazily and retained for the process
//! lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Registry of single-slot execution lanes, one per key.
#[derive(Debug, Default)]
pub struct KeyedLanes {
    lanes: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl KeyedLanes {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lane for `key`, waiting behind earlier holders.
    ///
    /// Tokio semaphores hand out permits in FIFO order, which is what
    /// gives jobs on one key their enqueue-order execution guarantee.
    #[allow(clippy::expect_used)] // the semaphore is never closed
    pub async fn acquire(&self, key: &str) -> OwnedSemaphorePermit {
        let lane = {
            let mut lanes = self.lanes.lock().await;
            lanes
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        lane.acquire_owned().await.expect("lane semaphore closed")
    }

    /// Number of lanes instantiated so far.
    pub async fn lane_count(&self) -> usize {
        self.lanes.lock().await.len()
    }
}
