//! Durable job store collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use courier_common::{AppError, AppResult};

use crate::job::StoredJob;

/// A side effect committed atomically with a job insert.
pub type SideEffect<'a> = BoxFuture<'a, AppResult<()>>;

/// Durable store for queued jobs.
///
/// The queue treats this as an opaque record store. The one structural
/// requirement is `insert_atomic`: a job and the record it pertains to
/// (for example, "save this job and mark the originating message as
/// queued") must commit together or not at all.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: &StoredJob) -> AppResult<()>;

    /// Persist a new job and run `side_effect` in the same transaction.
    async fn insert_atomic(&self, job: &StoredJob, side_effect: SideEffect<'_>) -> AppResult<()>;

    /// Persist a new attempt count for a job.
    async fn update_attempts(&self, id: &str, attempts: u32) -> AppResult<()>;

    /// Remove a finished job.
    async fn remove(&self, id: &str) -> AppResult<()>;

    /// All persisted jobs for one queue, in enqueue order.
    async fn list_pending(&self, queue_type: &str) -> AppResult<Vec<StoredJob>>;
}

/// In-memory job store.
///
/// Backs the test suite; `insert_atomic` holds the store lock across the
/// side effect so the combined write is observed atomically.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<Vec<StoredJob>>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted jobs, for assertions.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &StoredJob) -> AppResult<()> {
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }

    async fn insert_atomic(&self, job: &StoredJob, side_effect: SideEffect<'_>) -> AppResult<()> {
        let mut jobs = self.jobs.lock().await;
        side_effect.await?;
        jobs.push(job.clone());
        Ok(())
    }

    async fn update_attempts(&self, id: &str, attempts: u32) -> AppResult<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| AppError::Storage(format!("no such job: {id}")))?;
        job.attempts = attempts;
        Ok(())
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        self.jobs.lock().await.retain(|job| job.id != id);
        Ok(())
    }

    async fn list_pending(&self, queue_type: &str) -> AppResult<Vec<StoredJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|job| job.queue_type == queue_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(id: &str) -> StoredJob {
        StoredJob {
            id: id.into(),
            queue_type: "conversation".into(),
            payload: serde_json::json!({}),
            enqueued_at: Utc::now(),
            attempts: 0,
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_insert_list_remove() {
        let store = MemoryJobStore::new();
        store.insert(&job("a")).await.expect("insert");
        store.insert(&job("b")).await.expect("insert");

        let pending = store.list_pending("conversation").await.expect("list");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, "a"); // enqueue order

        store.remove("a").await.expect("remove");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_atomic_rolls_back_on_side_effect_failure() {
        let store = MemoryJobStore::new();
        let result = store
            .insert_atomic(
                &job("a"),
                Box::pin(async { Err(AppError::Storage("side effect failed".into())) }),
            )
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_attempts() {
        let store = MemoryJobStore::new();
        store.insert(&job("a")).await.expect("insert");
        store.update_attempts("a", 2).await.expect("update");

        let pending = store.list_pending("conversation").await.expect("list");
        assert_eq!(pending[0].attempts, 2);

        assert!(store.update_attempts("missing", 1).await.is_err());
    }
}
