//! Session and credential counters.
//!
//! Counters are plain atomics so tests and embedding code can read
//! them directly; each increment is mirrored to the `metrics` facade
//! with the `tutor_` prefix. Counters reset only at process start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters owned by the session state machine.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connection_attempts: AtomicU64,
    credential_refreshes: AtomicU64,
    errors: AtomicU64,
}

impl SessionMetrics {
    /// Create a new shared counter set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record one connect (or reconnect) attempt.
    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tutor_connection_attempts_total").increment(1);
    }

    /// Record one successful mid-session credential refresh.
    pub fn record_credential_refresh(&self) {
        self.credential_refreshes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tutor_credential_refreshes_total").increment(1);
    }

    /// Record one session error surfaced to the snapshot.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tutor_session_errors_total").increment(1);
    }

    /// Total connect attempts since process start.
    #[must_use]
    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts.load(Ordering::Relaxed)
    }

    /// Total successful credential refreshes since process start.
    #[must_use]
    pub fn credential_refreshes(&self) -> u64 {
        self.credential_refreshes.load(Ordering::Relaxed)
    }

    /// Total surfaced errors since process start.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Counters owned by the credential provider.
#[derive(Debug, Default)]
pub struct CredentialMetrics {
    requests: AtomicU64,
    failures: AtomicU64,
}

impl CredentialMetrics {
    /// Create a new shared counter set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record one credential endpoint invocation.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tutor_credential_requests_total").increment(1);
    }

    /// Record one failed invocation (transport or validation).
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tutor_credential_failures_total").increment(1);
    }

    /// Total credential requests since process start.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Total credential failures since process start.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn session_counters_accumulate() {
        let metrics = SessionMetrics::new();

        metrics.record_connection_attempt();
        metrics.record_connection_attempt();
        metrics.record_credential_refresh();
        metrics.record_error();

        assert_eq!(metrics.connection_attempts(), 2);
        assert_eq!(metrics.credential_refreshes(), 1);
        assert_eq!(metrics.errors(), 1);
    }

    #[test]
    fn credential_counters_accumulate() {
        let metrics = CredentialMetrics::new();

        metrics.record_request();
        metrics.record_request();
        metrics.record_failure();

        assert_eq!(metrics.requests(), 2);
        assert_eq!(metrics.failures(), 1);
    }
}
