//! Attempt-error classification.
//!
//! After a failed attempt the runner hands every collected error to the
//! classifier, which folds them into a single retry decision: stop now,
//! or retry after an optional server-mandated delay.

use std::time::Duration;

use courier_core::delivery::SendError;

/// The folded decision for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Longest server-mandated wait among the errors, if any.
    pub retry_after: Option<Duration>,
    /// Whether retrying is pointless and the job must fail now.
    pub is_terminal: bool,
    /// The error reported in logs and surfaced upward.
    pub representative: SendError,
}

/// Fold a non-empty error list into one [`Classification`].
///
/// Every error is logged individually. A rate-limit wait is honored even
/// when other recipients failed differently, and when several recipients
/// were rate limited the longest wait wins. A server-stop answer, or an
/// attempt that was already the last one allowed, makes the decision
/// terminal.
#[must_use]
pub fn classify_attempt(errors: &[SendError], is_final_attempt: bool) -> Classification {
    let mut retry_after: Option<Duration> = None;
    let mut is_terminal = is_final_attempt;

    for error in errors {
        tracing::warn!(error = %error, "Send attempt error");

        if let Some(wait) = error.retry_after() {
            retry_after = Some(match retry_after {
                Some(current) => current.max(wait),
                None => wait,
            });
        }
        if error.is_server_stop() {
            is_terminal = true;
        }
    }

    let representative = errors
        .first()
        .cloned()
        .unwrap_or_else(|| SendError::Network("attempt failed without detail".into()));

    Classification {
        retry_after,
        is_terminal,
        representative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::delivery::{STATUS_RATE_LIMITED, STATUS_SERVER_STOP};

    fn rate_limited(secs: u64) -> SendError {
        SendError::Http {
            code: STATUS_RATE_LIMITED,
            retry_after: Some(Duration::from_secs(secs)),
            message: "rate limited".into(),
        }
    }

    #[test]
    fn test_longest_rate_limit_wait_wins() {
        let errors = vec![rate_limited(5), rate_limited(30), rate_limited(2)];
        let decision = classify_attempt(&errors, false);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(30)));
        assert!(!decision.is_terminal);
    }

    #[test]
    fn test_rate_limit_survives_mixed_errors() {
        let errors = vec![SendError::Timeout, rate_limited(10)];
        let decision = classify_attempt(&errors, false);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(10)));
        assert_eq!(decision.representative, SendError::Timeout);
    }

    #[test]
    fn test_server_stop_is_terminal() {
        let errors = vec![
            rate_limited(10),
            SendError::Http {
                code: STATUS_SERVER_STOP,
                retry_after: None,
                message: "stop".into(),
            },
        ];
        let decision = classify_attempt(&errors, false);
        assert!(decision.is_terminal);
    }

    #[test]
    fn test_final_attempt_is_terminal() {
        let decision = classify_attempt(&[SendError::Timeout], true);
        assert!(decision.is_terminal);
        assert_eq!(decision.retry_after, None);
    }

    #[test]
    fn test_plain_failures_retry() {
        let decision = classify_attempt(&[SendError::Network("reset".into())], false);
        assert!(!decision.is_terminal);
        assert_eq!(decision.retry_after, None);
    }
}
