//! Bus connection manager.
//!
//! Owns the shared producer handle and applies one [`RetryPolicy`] to every
//! connect: producer startup, consumer (re)subscription, and background
//! producer reconnection after a drop. Exhausting the policy is fatal for the
//! owning process; steady-state exhaustion trips [`BusConnectionManager::fatal`].

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bus::{AppendAck, BusConnector, BusProducer, BusSubscription},
    error::{BusError, BusRole, ConnectionError},
};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 1.0 keeps the delay fixed; anything above grows it per attempt.
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            base_delay: Duration::from_secs(1),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn exponential(
        max_attempts: u32,
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Pause after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.max(self.base_delay);
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        Duration::from_secs_f64(secs)
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    pub async fn retry<T, F, Fut>(
        &self,
        role: BusRole,
        mut op: F,
    ) -> Result<T, ConnectionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BusError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(%role, attempt, "event bus connection established after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        %role,
                        attempt,
                        max_attempts = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "event bus connection attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(%role, attempts, error = %err, "event bus connection retries exhausted");
                    return Err(ConnectionError::Exhausted {
                        role,
                        attempts,
                        last: err,
                    });
                }
            }
        }
    }
}

struct ProducerSlot {
    generation: u64,
    producer: Arc<dyn BusProducer>,
}

/// The single owner of raw bus connections.
pub struct BusConnectionManager {
    connector: Arc<dyn BusConnector>,
    policy: RetryPolicy,
    producer: RwLock<Option<ProducerSlot>>,
    generation: AtomicU64,
    reconnecting: AtomicBool,
    fatal: CancellationToken,
}

impl std::fmt::Debug for BusConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConnectionManager")
            .field("endpoint", &self.connector.endpoint())
            .field("policy", &self.policy)
            .field("producer_connected", &self.is_producer_connected())
            .finish()
    }
}

impl BusConnectionManager {
    pub fn new(connector: Arc<dyn BusConnector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            producer: RwLock::new(None),
            generation: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
            fatal: CancellationToken::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Cancelled when a background reconnect gives up.
    pub fn fatal(&self) -> CancellationToken {
        self.fatal.clone()
    }

    pub fn is_producer_connected(&self) -> bool {
        self.producer.read().is_some()
    }

    /// Establishes the producer connection, retrying per policy.
    pub async fn connect_producer(&self) -> Result<(), ConnectionError> {
        let endpoint = self.connector.endpoint();
        info!(%endpoint, "connecting to event bus as producer");
        let producer = self
            .policy
            .retry(BusRole::Producer, || self.connector.connect_producer())
            .await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.producer.write() = Some(ProducerSlot {
            generation,
            producer,
        });
        info!(%endpoint, "connected to event bus as producer");
        Ok(())
    }

    /// Opens a subscription, retrying per policy.
    pub async fn subscribe(
        &self,
        topic: &str,
        from_earliest: bool,
    ) -> Result<Box<dyn BusSubscription>, ConnectionError> {
        let endpoint = self.connector.endpoint();
        info!(%endpoint, topic, from_earliest, "subscribing to event bus topic");
        self.policy
            .retry(BusRole::Consumer, || {
                self.connector.subscribe(topic, from_earliest)
            })
            .await
    }

    /// Single append attempt on the current producer connection.
    ///
    /// A disconnect is reported to the caller as-is; the manager then drops
    /// the dead handle and reconnects in the background.
    pub async fn append(
        self: &Arc<Self>,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<AppendAck, BusError> {
        let (generation, producer) = {
            let guard = self.producer.read();
            match guard.as_ref() {
                Some(slot) => (slot.generation, Arc::clone(&slot.producer)),
                None => return Err(BusError::NotConnected),
            }
        };

        match producer.append(topic, payload).await {
            Err(err) if err.is_disconnect() => {
                self.discard_producer(generation);
                self.spawn_reconnect();
                Err(err)
            }
            other => other,
        }
    }

    /// Drops the producer handle.
    pub fn close(&self) {
        if self.producer.write().take().is_some() {
            debug!("event bus producer closed");
        }
    }

    fn discard_producer(&self, generation: u64) {
        let mut guard = self.producer.write();
        if guard
            .as_ref()
            .is_some_and(|slot| slot.generation == generation)
        {
            warn!(generation, "dropping disconnected event bus producer");
            *guard = None;
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = manager.connect_producer().await {
                error!(error = %err, "event bus producer could not reconnect");
                manager.fatal.cancel();
            }
            manager.reconnecting.store(false, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    #[test]
    fn fixed_policy_keeps_delay_constant() {
        let policy = RetryPolicy::fixed(15, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(14), Duration::from_secs(1));
    }

    #[test]
    fn exponential_policy_is_capped() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(500),
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(60), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn append_before_connect_is_rejected() {
        let bus = MemoryBus::new();
        let manager = Arc::new(BusConnectionManager::new(
            Arc::new(bus.connector("g")),
            RetryPolicy::fixed(1, Duration::from_millis(1)),
        ));

        let err = manager.append("t", vec![1]).await.unwrap_err();
        assert_eq!(err, BusError::NotConnected);
        assert!(bus.messages("t").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn producer_reconnects_after_drop() {
        let bus = MemoryBus::new();
        let manager = Arc::new(BusConnectionManager::new(
            Arc::new(bus.connector("g")),
            RetryPolicy::fixed(3, Duration::from_millis(10)),
        ));
        manager.connect_producer().await.unwrap();

        bus.sever();
        let err = manager.append("t", vec![1]).await.unwrap_err();
        assert!(err.is_disconnect());

        for _ in 0..10 {
            if manager.is_producer_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.is_producer_connected());
        assert!(manager.append("t", vec![2]).await.is_ok());
        assert!(!manager.fatal().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_background_reconnect_is_fatal() {
        let bus = MemoryBus::new();
        let manager = Arc::new(BusConnectionManager::new(
            Arc::new(bus.connector("g")),
            RetryPolicy::fixed(2, Duration::from_millis(10)),
        ));
        manager.connect_producer().await.unwrap();

        bus.set_reachable(false);
        assert!(manager.append("t", vec![1]).await.is_err());

        tokio::time::timeout(Duration::from_secs(5), manager.fatal().cancelled())
            .await
            .expect("fatal signal");
        assert!(!manager.is_producer_connected());
    }
}
