use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{
    AppendAck, BusConnector, BusProducer, BusSubscription, RawMessage,
};
use crate::error::BusError;

/// In-process partitioned log with consumer-group offsets.
///
/// Behaves like a single broker: appends are ordered per partition, each
/// group resumes from its last committed offset, and [`MemoryBus::sever`]
/// drops every live producer and subscription so callers go through their
/// reconnect path.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<BusState>,
    notify: Notify,
    partitions: usize,
}

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, Vec<Vec<Vec<u8>>>>,
    // (group, topic, partition) -> next offset to read
    committed: HashMap<(String, String, i32), i64>,
    generation: u64,
    unreachable: bool,
    round_robin: usize,
}

impl BusState {
    fn partitions_mut(
        &mut self,
        topic: &str,
        count: usize,
    ) -> &mut Vec<Vec<Vec<u8>>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); count])
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BusState::default()),
                notify: Notify::new(),
                partitions: partitions.max(1),
            }),
        }
    }

    pub fn connector(&self, group: impl Into<String>) -> MemoryConnector {
        MemoryConnector {
            bus: self.clone(),
            group: group.into(),
        }
    }

    /// Appends without going through a producer connection.
    pub fn append(&self, topic: &str, payload: Vec<u8>) -> AppendAck {
        let ack = {
            let mut state = self.inner.state.lock();
            let partition = state.round_robin % self.inner.partitions;
            state.round_robin = state.round_robin.wrapping_add(1);
            let log = &mut state.partitions_mut(topic, self.inner.partitions)
                [partition];
            log.push(payload);
            AppendAck {
                partition: partition as i32,
                offset: (log.len() - 1) as i64,
            }
        };
        self.inner.notify.notify_waiters();
        ack
    }

    /// Drops every live connection. New connections still succeed.
    pub fn sever(&self) {
        self.inner.state.lock().generation += 1;
        self.inner.notify.notify_waiters();
    }

    /// While unreachable every connect attempt fails.
    pub fn set_reachable(&self, reachable: bool) {
        {
            let mut state = self.inner.state.lock();
            state.unreachable = !reachable;
            if !reachable {
                state.generation += 1;
            }
        }
        self.inner.notify.notify_waiters();
    }

    /// Every message on `topic`, partition by partition.
    pub fn messages(&self, topic: &str) -> Vec<RawMessage> {
        let state = self.inner.state.lock();
        state
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .enumerate()
                    .flat_map(|(partition, log)| {
                        log.iter().enumerate().map(move |(offset, payload)| {
                            RawMessage {
                                topic: topic.to_string(),
                                partition: partition as i32,
                                offset: offset as i64,
                                payload: payload.clone(),
                            }
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Option<i64> {
        self.inner
            .state
            .lock()
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    fn check_reachable(&self, endpoint: String) -> Result<u64, BusError> {
        let state = self.inner.state.lock();
        if state.unreachable {
            return Err(BusError::Connect {
                endpoint,
                reason: "broker unreachable".to_string(),
            });
        }
        Ok(state.generation)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    bus: MemoryBus,
    group: String,
}

#[async_trait]
impl BusConnector for MemoryConnector {
    fn endpoint(&self) -> String {
        format!("memory://{}", self.group)
    }

    async fn connect_producer(&self) -> Result<Arc<dyn BusProducer>, BusError> {
        let generation = self.bus.check_reachable(self.endpoint())?;
        Ok(Arc::new(MemoryProducer {
            bus: self.bus.clone(),
            generation,
        }))
    }

    async fn subscribe(
        &self,
        topic: &str,
        from_earliest: bool,
    ) -> Result<Box<dyn BusSubscription>, BusError> {
        let generation = self.bus.check_reachable(self.endpoint())?;
        let partitions = self.bus.inner.partitions;

        let positions = {
            let mut state = self.bus.inner.state.lock();
            let lengths: Vec<i64> = state
                .partitions_mut(topic, partitions)
                .iter()
                .map(|log| log.len() as i64)
                .collect();
            lengths
                .into_iter()
                .enumerate()
                .map(|(partition, len)| {
                    let key =
                        (self.group.clone(), topic.to_string(), partition as i32);
                    match state.committed.get(&key) {
                        Some(next) => *next,
                        None if from_earliest => 0,
                        None => len,
                    }
                })
                .collect()
        };

        Ok(Box::new(MemorySubscription {
            bus: self.bus.clone(),
            group: self.group.clone(),
            topic: topic.to_string(),
            positions,
            generation,
        }))
    }
}

struct MemoryProducer {
    bus: MemoryBus,
    generation: u64,
}

#[async_trait]
impl BusProducer for MemoryProducer {
    async fn append(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<AppendAck, BusError> {
        {
            let state = self.bus.inner.state.lock();
            if state.unreachable || state.generation != self.generation {
                return Err(BusError::Disconnected(
                    "memory bus connection severed".to_string(),
                ));
            }
        }
        Ok(self.bus.append(topic, payload))
    }
}

struct MemorySubscription {
    bus: MemoryBus,
    group: String,
    topic: String,
    positions: Vec<i64>,
    generation: u64,
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    async fn next_message(&mut self) -> Option<Result<RawMessage, BusError>> {
        loop {
            let notified = self.bus.inner.notify.notified();
            {
                let state = self.bus.inner.state.lock();
                if state.generation != self.generation {
                    return Some(Err(BusError::Disconnected(
                        "memory bus connection severed".to_string(),
                    )));
                }
                if let Some(partitions) = state.topics.get(&self.topic) {
                    for (partition, log) in partitions.iter().enumerate() {
                        let position = self.positions[partition];
                        if let Some(payload) = log.get(position as usize) {
                            self.positions[partition] += 1;
                            return Some(Ok(RawMessage {
                                topic: self.topic.clone(),
                                partition: partition as i32,
                                offset: position,
                                payload: payload.clone(),
                            }));
                        }
                    }
                }
            }
            notified.await;
        }
    }

    async fn commit(&mut self, message: &RawMessage) -> Result<(), BusError> {
        let mut state = self.bus.inner.state.lock();
        if state.generation != self.generation {
            return Err(BusError::Commit(
                "connection severed before commit".to_string(),
            ));
        }
        let key = (self.group.clone(), message.topic.clone(), message.partition);
        let next = message.offset + 1;
        let entry = state.committed.entry(key).or_insert(next);
        if *entry < next {
            *entry = next;
        }
        Ok(())
    }
}
