//! Approval gate.
//!
//! A keyed wait/notify registry for external approval events (a challenge
//! solved, a safety-number re-verification confirmed). A job that is
//! blocked subscribes to its key's waiter and races it against a ceiling
//! timeout; the surrounding application calls [`ApprovalGate::resolve`]
//! when the approval arrives.
//!
//! There is exactly one live waiter per key: a second subscriber joins the
//! existing one instead of creating a duplicate, and a single `resolve`
//! wakes every joined subscriber.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, watch};

/// Keyed approval wait/notify registry.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    waiters: Mutex<HashMap<String, watch::Sender<bool>>>,
    pending: Mutex<HashSet<String>>,
}

impl ApprovalGate {
    /// Create an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate behind an [`Arc`], the form the queue consumes.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Mark `key` as requiring approval before further sends.
    pub async fn require(&self, key: &str) {
        let newly_pending = self.pending.lock().await.insert(key.to_string());
        if newly_pending {
            tracing::info!(key = %key, "Approval now required");
        }
    }

    /// Whether an approval is currently pending for `key`.
    pub async fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().await.contains(key)
    }

    /// Subscribe to the waiter for `key`, joining an existing one if
    /// present.
    pub async fn subscribe(&self, key: &str) -> watch::Receiver<bool> {
        let mut waiters = self.waiters.lock().await;
        if let Some(sender) = waiters.get(key) {
            tracing::info!(key = %key, "Joining existing approval waiter");
            return sender.subscribe();
        }

        tracing::info!(key = %key, "Starting new approval waiter");
        let (sender, receiver) = watch::channel(false);
        waiters.insert(key.to_string(), sender);
        receiver
    }

    /// Wait until the approval for `key` resolves.
    ///
    /// Callers always race this against a ceiling timeout so a vanished
    /// approval event cannot stall a job forever.
    pub async fn wait(&self, key: &str) {
        let mut receiver = self.subscribe(key).await;
        // Also completes if the sender is dropped during teardown.
        let _ = receiver.wait_for(|resolved| *resolved).await;
    }

    /// Resolve the approval for `key`, waking every joined waiter.
    ///
    /// Resolving an absent waiter is not an error: the approval may have
    /// arrived after the job already gave up and moved on.
    pub async fn resolve(&self, key: &str) {
        self.pending.lock().await.remove(key);

        let sender = self.waiters.lock().await.remove(key);
        match sender {
            Some(sender) => {
                tracing::info!(key = %key, "Resolving approval waiter");
                let _ = sender.send(true);
            }
            None => {
                tracing::warn!(key = %key, "No approval waiter to resolve; ignoring");
            }
        }
    }

    /// Forced teardown: drop every waiter without resolving.
    ///
    /// Waiters wake (their channel closes) and observe an unresolved
    /// approval on their next evaluation.
    pub async fn reject_all(&self) {
        let count = {
            let mut waiters = self.waiters.lock().await;
            let count = waiters.len();
            waiters.clear();
            count
        };
        if count > 0 {
            tracing::warn!(count, "Dropped approval waiters during teardown");
        }
    }

    /// Number of live waiters, for assertions.
    pub async fn waiter_count(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_subscriber_joins_existing_waiter() {
        let gate = ApprovalGate::shared();

        let first = gate.subscribe("c1").await;
        let second = gate.subscribe("c1").await;
        assert_eq!(gate.waiter_count().await, 1);
        assert!(first.same_channel(&second));
    }

    #[tokio::test]
    async fn test_one_resolve_wakes_all_joined_waiters() {
        let gate = ApprovalGate::shared();
        gate.require("c1").await;

        let gate_a = gate.clone();
        let waiter_a = tokio::spawn(async move { gate_a.wait("c1").await });
        let gate_b = gate.clone();
        let waiter_b = tokio::spawn(async move { gate_b.wait("c1").await });

        // Let both subscribe before resolving.
        tokio::task::yield_now().await;
        gate.resolve("c1").await;

        tokio::time::timeout(Duration::from_secs(1), async {
            waiter_a.await.expect("waiter a");
            waiter_b.await.expect("waiter b");
        })
        .await
        .expect("both waiters resolve");

        assert!(!gate.is_pending("c1").await);
        assert_eq!(gate.waiter_count().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_without_waiter_is_a_no_op() {
        let gate = ApprovalGate::new();
        gate.resolve("never-seen").await;
        assert_eq!(gate.waiter_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_races_cleanly_with_timeout() {
        let gate = ApprovalGate::shared();
        gate.require("c1").await;

        let result =
            tokio::time::timeout(Duration::from_secs(300), gate.wait("c1")).await;
        assert!(result.is_err(), "unresolved wait must hit the ceiling");
        assert!(gate.is_pending("c1").await);
    }

    #[tokio::test]
    async fn test_reject_all_wakes_waiters_unresolved() {
        let gate = ApprovalGate::shared();
        gate.require("c1").await;

        let gate_w = gate.clone();
        let waiter = tokio::spawn(async move { gate_w.wait("c1").await });
        tokio::task::yield_now().await;

        gate.reject_all().await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter wakes")
            .expect("waiter task");

        // The approval itself is still pending.
        assert!(gate.is_pending("c1").await);
    }
}
