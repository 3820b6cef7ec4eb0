//! Dual persistence of consumed audit events.
//!
//! Each event gets a [`LogId`] and is written to the fast store first and the
//! durable store second. The two writes are independent: a failure on one
//! side is logged and reported in [`PersistResult`], never rolled back, and
//! never prevents the other write. Divergent outcomes are logged under the
//! `auditoria::reconcile` target so an external job can repair them.

pub mod log_id;

use std::{future::Future, sync::Arc, time::Duration};

use auditoria_model::{AuditEvent, LogId, PersistedLogRecord};
use tracing::{error, info, warn};

use crate::{
    bus::MessageOrigin,
    error::StoreWriteError,
    store::{DurableStore, FastStore, JSON_CONTENT_TYPE},
};

pub use log_id::{
    LogIdGenerator, LogIdStrategy, OffsetLogIds, TimestampLogIds, UuidLogIds,
};

pub const DEFAULT_OBJECT_PREFIX: &str = "eventos";

/// Bounds on a single store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePolicy {
    pub timeout: Duration,
    /// Total attempts per store, including the first.
    pub max_attempts: u32,
    /// Pause before the second attempt; doubles for each one after.
    pub retry_delay: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 1,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl WritePolicy {
    /// Pause after the `attempt`-th failed write (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1 << exponent)
    }
}

/// Per-store outcome for one persisted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistResult {
    pub log_id: LogId,
    pub origin: Option<MessageOrigin>,
    pub fast_ok: bool,
    pub durable_ok: bool,
    pub fast_error: Option<StoreWriteError>,
    pub durable_error: Option<StoreWriteError>,
}

impl PersistResult {
    pub fn is_complete(&self) -> bool {
        self.fast_ok && self.durable_ok
    }

    /// Exactly one copy exists.
    pub fn is_partial(&self) -> bool {
        self.fast_ok != self.durable_ok
    }

    /// Neither copy exists.
    pub fn is_lost(&self) -> bool {
        !self.fast_ok && !self.durable_ok
    }
}

pub struct PersistenceCoordinator {
    fast: Arc<dyn FastStore>,
    durable: Arc<dyn DurableStore>,
    log_ids: Arc<dyn LogIdGenerator>,
    policy: WritePolicy,
    object_prefix: String,
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("log_ids", &self.log_ids)
            .field("policy", &self.policy)
            .field("object_prefix", &self.object_prefix)
            .finish()
    }
}

impl PersistenceCoordinator {
    pub fn new(fast: Arc<dyn FastStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            fast,
            durable,
            log_ids: Arc::new(UuidLogIds),
            policy: WritePolicy::default(),
            object_prefix: DEFAULT_OBJECT_PREFIX.to_string(),
        }
    }

    pub fn with_log_ids(mut self, log_ids: Arc<dyn LogIdGenerator>) -> Self {
        self.log_ids = log_ids;
        self
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_object_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.object_prefix = prefix.into();
        self
    }

    pub async fn persist(
        &self,
        event: AuditEvent,
        origin: Option<&MessageOrigin>,
    ) -> PersistResult {
        let log_id = self.log_ids.generate(origin);
        let record = PersistedLogRecord::new(log_id.clone(), event);
        let body = record.to_json();

        let fast_result = self
            .write("fast", || self.fast.set(log_id.as_str(), &body))
            .await;
        match &fast_result {
            Ok(()) => info!(%log_id, "stored audit record in fast store"),
            Err(err) => {
                error!(%log_id, error = %err, "fast store write failed")
            }
        }

        let key = log_id.object_key(&self.object_prefix);
        let durable_result = self
            .write("durable", || {
                self.durable
                    .put(&key, body.clone().into_bytes(), JSON_CONTENT_TYPE)
            })
            .await;
        match &durable_result {
            Ok(()) => info!(%log_id, %key, "stored audit record in durable store"),
            Err(err) => {
                error!(%log_id, %key, error = %err, "durable store write failed")
            }
        }

        let result = PersistResult {
            log_id,
            origin: origin.cloned(),
            fast_ok: fast_result.is_ok(),
            durable_ok: durable_result.is_ok(),
            fast_error: fast_result.err(),
            durable_error: durable_result.err(),
        };

        if !result.is_complete() {
            warn!(
                target: "auditoria::reconcile",
                log_id = %result.log_id,
                origin = ?result.origin.as_ref().map(ToString::to_string),
                fast_ok = result.fast_ok,
                durable_ok = result.durable_ok,
                "audit record copies diverged"
            );
        }

        result
    }

    async fn write<F, Fut>(
        &self,
        store: &'static str,
        mut op: F,
    ) -> Result<(), StoreWriteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StoreWriteError>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.policy.timeout, op())
                .await
                .unwrap_or(Err(StoreWriteError::Timeout {
                    store,
                    timeout: self.policy.timeout,
                }));
            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        store,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying store write"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryFastStore, ObjectDurableStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct FailingFast;

    #[async_trait]
    impl FastStore for FailingFast {
        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreWriteError> {
            Err(StoreWriteError::backend("fast", "connection refused"))
        }
    }

    #[derive(Debug, Default)]
    struct FlakyDurable {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DurableStore for FlakyDurable {
        async fn put(
            &self,
            _key: &str,
            _body: Vec<u8>,
            _content_type: &'static str,
        ) -> Result<(), StoreWriteError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreWriteError::backend("durable", "503 slow down"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Debug, Default)]
    struct HangingFast;

    #[async_trait]
    impl FastStore for HangingFast {
        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreWriteError> {
            std::future::pending().await
        }
    }

    fn event() -> AuditEvent {
        AuditEvent::new("alice", "login", Utc::now())
    }

    #[tokio::test]
    async fn writes_both_copies() {
        let fast = Arc::new(MemoryFastStore::new());
        let durable = Arc::new(ObjectDurableStore::memory().unwrap());
        let coordinator =
            PersistenceCoordinator::new(fast.clone(), durable.clone());

        let result = coordinator.persist(event(), None).await;

        assert!(result.is_complete());
        let cached = fast.get(result.log_id.as_str()).unwrap();
        let stored = durable
            .get(&result.log_id.object_key(DEFAULT_OBJECT_PREFIX))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.as_bytes(), stored.as_slice());
    }

    #[tokio::test]
    async fn fast_failure_does_not_block_durable_write() {
        let durable = Arc::new(ObjectDurableStore::memory().unwrap());
        let coordinator =
            PersistenceCoordinator::new(Arc::new(FailingFast), durable.clone());

        let result = coordinator.persist(event(), None).await;

        assert!(!result.fast_ok);
        assert!(result.durable_ok);
        assert!(result.is_partial());
        assert!(result.fast_error.is_some());
        assert!(
            durable
                .get(&result.log_id.object_key(DEFAULT_OBJECT_PREFIX))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn single_attempt_by_default() {
        let durable = Arc::new(FlakyDurable::default());
        let coordinator = PersistenceCoordinator::new(
            Arc::new(MemoryFastStore::new()),
            durable.clone(),
        );

        let result = coordinator.persist(event(), None).await;

        assert!(result.fast_ok);
        assert!(!result.durable_ok);
        assert_eq!(durable.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_attempts_recover_transient_failure() {
        let durable = Arc::new(FlakyDurable::default());
        let coordinator = PersistenceCoordinator::new(
            Arc::new(MemoryFastStore::new()),
            durable.clone(),
        )
        .with_write_policy(WritePolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
        });

        let result = coordinator.persist(event(), None).await;

        assert!(result.is_complete());
        assert_eq!(durable.calls.load(Ordering::SeqCst), 2);
    }

    #[derive(Debug, Default)]
    struct DownDurable {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DurableStore for DownDurable {
        async fn put(
            &self,
            _key: &str,
            _body: Vec<u8>,
            _content_type: &'static str,
        ) -> Result<(), StoreWriteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreWriteError::backend("durable", "503 slow down"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_between_attempts() {
        let durable = Arc::new(DownDurable::default());
        let coordinator = PersistenceCoordinator::new(
            Arc::new(MemoryFastStore::new()),
            durable.clone(),
        )
        .with_write_policy(WritePolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        });

        let started = tokio::time::Instant::now();
        let result = coordinator.persist(event(), None).await;

        assert!(!result.durable_ok);
        assert_eq!(durable.calls.load(Ordering::SeqCst), 3);
        // 500ms after the first failure, 1s after the second.
        assert!(started.elapsed() >= Duration::from_millis(1_500));
    }

    #[test]
    fn write_retry_delay_doubles() {
        let policy = WritePolicy {
            retry_delay: Duration::from_millis(100),
            ..WritePolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_write_times_out() {
        let coordinator = PersistenceCoordinator::new(
            Arc::new(HangingFast),
            Arc::new(ObjectDurableStore::memory().unwrap()),
        )
        .with_write_policy(WritePolicy {
            timeout: Duration::from_millis(50),
            max_attempts: 1,
            ..WritePolicy::default()
        });

        let result = coordinator.persist(event(), None).await;

        assert!(matches!(
            result.fast_error,
            Some(StoreWriteError::Timeout { store: "fast", .. })
        ));
        assert!(result.durable_ok);
    }

    #[tokio::test]
    async fn offset_ids_make_redelivery_overwrite() {
        let fast = Arc::new(MemoryFastStore::new());
        let coordinator = PersistenceCoordinator::new(
            fast.clone(),
            Arc::new(ObjectDurableStore::memory().unwrap()),
        )
        .with_log_ids(LogIdStrategy::Offset.generator())
        .with_object_prefix("audit");
        let origin = MessageOrigin {
            topic: "logs-auditoria".to_string(),
            partition: 0,
            offset: 9,
        };

        let first = coordinator.persist(event(), Some(&origin)).await;
        let second = coordinator.persist(event(), Some(&origin)).await;

        assert_eq!(first.log_id, second.log_id);
        assert_eq!(fast.len(), 1);
    }
}
