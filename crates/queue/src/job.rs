//! Durable job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_common::AppResult;

use crate::jobs::JobPayload;

/// A job as the store persists it: the payload is raw JSON and is parsed
/// and validated fresh every time the job is picked up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredJob {
    /// Job ID.
    pub id: String,
    /// Name of the queue that owns this job.
    pub queue_type: String,
    /// Raw payload, parsed at read time.
    pub payload: serde_json::Value,
    /// When the job was first enqueued. The retry window counts from here.
    pub enqueued_at: DateTime<Utc>,
    /// Completed attempts.
    pub attempts: u32,
    /// Ceiling on attempts, derived from the retry window at enqueue time.
    pub max_attempts: u32,
}

impl StoredJob {
    /// Parse the raw payload into a typed [`Job`].
    ///
    /// A payload that fails to parse or validate is fatal; the caller
    /// discards the job.
    pub fn parse(&self) -> AppResult<Job> {
        let payload: JobPayload = serde_json::from_value(self.payload.clone())?;
        payload.validate()?;
        Ok(Job {
            id: self.id.clone(),
            queue_type: self.queue_type.clone(),
            payload,
            enqueued_at: self.enqueued_at,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
        })
    }
}

/// A parsed, validated job.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job ID.
    pub id: String,
    /// Name of the queue that owns this job.
    pub queue_type: String,
    /// Typed payload.
    pub payload: JobPayload,
    /// When the job was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Completed attempts.
    pub attempts: u32,
    /// Ceiling on attempts.
    pub max_attempts: u32,
}

impl Job {
    /// Whether the next attempt is the last one allowed.
    #[must_use]
    pub const fn is_final_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
