//! Consumer loop.
//!
//! One loop owns one subscription and processes strictly one message at a
//! time: decode, persist, commit, then ask for the next message. The commit
//! happens only after persistence was invoked, so a crash in between leads
//! to redelivery (at-least-once). Undecodable messages are reported and
//! committed past; store failures are reported and committed past as well.
//! Subscriptions that keep dropping before delivering anything are paced and
//! bounded by the connection manager's retry policy.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use auditoria_model::{DecodeError, decode};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bus::{BusSubscription, RawMessage},
    connection::BusConnectionManager,
    error::{BusError, BusRole, ConnectionError},
    persistence::{PersistResult, PersistenceCoordinator},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Processing,
    /// Connection retries exhausted. Terminal.
    Failed,
    /// Shut down on request. Terminal.
    Stopped,
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    persisted: AtomicU64,
    partial: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub persisted: u64,
    pub partial: u64,
    pub failed: u64,
    pub malformed: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &MessageOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            MessageOutcome::Skipped(_) => &self.malformed,
            MessageOutcome::Persisted(result) if result.is_complete() => {
                &self.persisted
            }
            MessageOutcome::Persisted(result) if result.is_partial() => {
                &self.partial
            }
            MessageOutcome::Persisted(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Persisted(PersistResult),
    Skipped(DecodeError),
}

pub struct ConsumerLoop {
    bus: Arc<BusConnectionManager>,
    coordinator: PersistenceCoordinator,
    topic: String,
    from_earliest: bool,
    state: watch::Sender<ConsumerState>,
    stats: Arc<ConsumerStats>,
}

impl std::fmt::Debug for ConsumerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerLoop")
            .field("topic", &self.topic)
            .field("from_earliest", &self.from_earliest)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConsumerLoop {
    pub fn new(
        bus: Arc<BusConnectionManager>,
        coordinator: PersistenceCoordinator,
        topic: impl Into<String>,
        from_earliest: bool,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            bus,
            coordinator,
            topic: topic.into(),
            from_earliest,
            state,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until `shutdown` fires or the bus cannot be reached.
    ///
    /// A dropped subscription sends the loop back through `Connecting` after
    /// the retry policy's pause. Drops count against the policy's attempt
    /// budget until a message is received again; an exhausted budget ends
    /// the loop with an error.
    pub async fn run(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), ConnectionError> {
        let policy = self.bus.policy().clone();
        let max_attempts = policy.max_attempts.max(1);
        let mut drops: u32 = 0;
        let mut last_drop: Option<BusError> = None;

        loop {
            if drops > 0 {
                if drops >= max_attempts {
                    let last = last_drop.take().unwrap_or_else(|| {
                        BusError::Disconnected("subscription ended".to_string())
                    });
                    self.set_state(ConsumerState::Failed);
                    error!(
                        topic = %self.topic,
                        attempts = drops,
                        error = %last,
                        "subscription keeps dropping; giving up"
                    );
                    return Err(ConnectionError::Exhausted {
                        role: BusRole::Consumer,
                        attempts: drops,
                        last,
                    });
                }

                let delay = policy.delay_after(drops);
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        self.stop();
                        return Ok(());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.set_state(ConsumerState::Connecting);
            let subscribed = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.stop();
                    return Ok(());
                }
                subscribed = self.bus.subscribe(&self.topic, self.from_earliest) => subscribed,
            };
            let mut subscription = match subscribed {
                Ok(subscription) => subscription,
                Err(err) => {
                    self.set_state(ConsumerState::Failed);
                    error!(topic = %self.topic, error = %err, "consumer could not subscribe");
                    return Err(err);
                }
            };

            self.set_state(ConsumerState::Subscribed);
            info!(topic = %self.topic, "audit consumer waiting for events");

            loop {
                let next = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        self.stop();
                        return Ok(());
                    }
                    next = subscription.next_message() => next,
                };

                match next {
                    Some(Ok(message)) => {
                        drops = 0;
                        last_drop = None;
                        self.handle(subscription.as_mut(), message).await;
                    }
                    Some(Err(err)) => {
                        drops += 1;
                        warn!(
                            topic = %self.topic,
                            attempt = drops,
                            max_attempts,
                            error = %err,
                            "subscription dropped, resubscribing"
                        );
                        last_drop = Some(err);
                        break;
                    }
                    None => {
                        drops += 1;
                        warn!(
                            topic = %self.topic,
                            attempt = drops,
                            max_attempts,
                            "subscription stream ended, resubscribing"
                        );
                        last_drop = None;
                        break;
                    }
                }
            }

            self.set_state(ConsumerState::Disconnected);
        }
    }

    /// Decodes and persists one message without committing it.
    pub async fn process_message(&self, message: &RawMessage) -> MessageOutcome {
        let origin = message.origin();
        let event = match decode(&message.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(%origin, error = %err, "dropping undecodable audit message");
                return MessageOutcome::Skipped(err);
            }
        };

        info!(%origin, accion = %event.action, "audit event received");
        MessageOutcome::Persisted(self.coordinator.persist(event, Some(&origin)).await)
    }

    async fn handle(
        &self,
        subscription: &mut dyn BusSubscription,
        message: RawMessage,
    ) {
        self.set_state(ConsumerState::Processing);

        let outcome = self.process_message(&message).await;
        self.stats.record(&outcome);

        if let Err(err) = subscription.commit(&message).await {
            // Not fatal: the message will simply be seen again.
            warn!(origin = %message.origin(), error = %err, "offset commit failed");
        } else {
            debug!(origin = %message.origin(), "offset committed");
        }

        self.set_state(ConsumerState::Subscribed);
    }

    fn stop(&self) {
        self.set_state(ConsumerState::Stopped);
        let stats = self.stats.snapshot();
        info!(
            received = stats.received,
            persisted = stats.persisted,
            partial = stats.partial,
            failed = stats.failed,
            malformed = stats.malformed,
            "audit consumer stopped"
        );
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}
