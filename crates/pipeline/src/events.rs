//! In-process event bus for agent and pipeline lifecycle.
//!
//! The bus is purely observational: events are kept in a bounded history,
//! appended to an [`EventLog`], and dispatched to subscribers, but nothing in
//! the pipeline's control flow ever reads them back.
//!
//! A bus is constructed explicitly and shared by `Arc`; tests build an isolated
//! bus each.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{trace, warn};

use crate::{AgentName, SubscriptionId, Timestamp};

/// Default number of events retained in memory.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub name: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Event log write failed at {path}: {message}")]
    Write { path: String, message: String },

    #[error("Event could not be serialised: {0}")]
    Serialization(String),
}

/// Append-only sink receiving every published event.
///
/// Appends are synchronous; a failing append is logged by the bus and never
/// reaches the publisher.
pub trait EventLog: Send + Sync {
    fn append(&self, event: &BusEvent) -> Result<(), EventLogError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventLog;

impl EventLog for NullEventLog {
    fn append(&self, _event: &BusEvent) -> Result<(), EventLogError> {
        Ok(())
    }
}

/// Keeps serialised event lines in memory.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, event: &BusEvent) -> Result<(), EventLogError> {
        let line =
            serde_json::to_string(event).map_err(|e| EventLogError::Serialization(e.to_string()))?;
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(line);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status vocabularies
// ---------------------------------------------------------------------------

/// Lifecycle points reported for a single agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentEventStatus {
    Start,
    Ready,
    Blocked,
    Error,
}

impl AgentEventStatus {
    /// Canonical event name, e.g. `agent:ready`.
    pub fn event_name(self) -> &'static str {
        match self {
            AgentEventStatus::Start => "agent:start",
            AgentEventStatus::Ready => "agent:ready",
            AgentEventStatus::Blocked => "agent:blocked",
            AgentEventStatus::Error => "agent:error",
        }
    }
}

/// Lifecycle points reported for a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineEventStatus {
    Start,
    Complete,
    Failed,
}

impl PipelineEventStatus {
    pub fn event_name(self) -> &'static str {
        match self {
            PipelineEventStatus::Start => "pipeline:start",
            PipelineEventStatus::Complete => "pipeline:complete",
            PipelineEventStatus::Failed => "pipeline:failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

type Subscriber = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Read-only summary of the in-memory history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusStats {
    pub total: usize,
    pub capacity: usize,
    pub by_name: BTreeMap<String, usize>,
    pub oldest: Option<Timestamp>,
    pub newest: Option<Timestamp>,
}

pub struct EventBus {
    capacity: usize,
    history: Mutex<VecDeque<BusEvent>>,
    subscribers: Mutex<HashMap<String, Vec<(SubscriptionId, Subscriber)>>>,
    next_subscription: AtomicU64,
    log: Arc<dyn EventLog>,
}

impl EventBus {
    /// Creates a bus retaining at most `capacity` events (minimum 1).
    pub fn new(capacity: usize, log: Arc<dyn EventLog>) -> Self {
        Self {
            capacity: capacity.max(1),
            history: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            log,
        }
    }

    /// A bus with the default capacity that logs nowhere.
    pub fn in_memory() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, Arc::new(NullEventLog))
    }

    /// Records and dispatches an event.
    ///
    /// Subscribers for `name` run synchronously in registration order after
    /// the event is stored and logged.
    pub fn publish(&self, name: impl Into<String>, data: Value) -> BusEvent {
        let event = BusEvent {
            name: name.into(),
            timestamp: Timestamp::now(),
            data,
        };

        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_back(event.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }

        if let Err(e) = self.log.append(&event) {
            warn!(event = %event.name, error = %e, "Failed to append event to log");
        }

        // Snapshot handlers so a subscriber may (un)subscribe or publish.
        let handlers: Vec<Subscriber> = {
            let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers
                .get(&event.name)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(&event);
        }

        trace!(event = %event.name, "Published event");
        event
    }

    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers
            .entry(name.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        before != list.len()
    }

    /// The most recent events, oldest first, optionally filtered by name.
    pub fn history(&self, name: Option<&str>, limit: Option<usize>) -> Vec<BusEvent> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let matching: Vec<&BusEvent> = history
            .iter()
            .filter(|e| name.is_none_or(|n| e.name == n))
            .collect();
        let skip = limit.map_or(0, |l| matching.len().saturating_sub(l));
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> BusStats {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let mut by_name = BTreeMap::new();
        for event in history.iter() {
            *by_name.entry(event.name.clone()).or_insert(0) += 1;
        }
        BusStats {
            total: history.len(),
            capacity: self.capacity,
            by_name,
            oldest: history.front().map(|e| e.timestamp),
            newest: history.back().map(|e| e.timestamp),
        }
    }

    pub fn clear(&self) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Publishes `agent:<status>` with the agent name merged into `data`.
    pub fn publish_agent_event(
        &self,
        agent: &AgentName,
        status: AgentEventStatus,
        data: Value,
    ) -> BusEvent {
        self.publish(status.event_name(), with_field(data, "agent", json!(agent.as_str())))
    }

    /// Publishes `pipeline:<status>`.
    pub fn publish_pipeline_event(&self, status: PipelineEventStatus, data: Value) -> BusEvent {
        self.publish(status.event_name(), data)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

fn with_field(data: Value, key: &str, value: Value) -> Value {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    map.insert(key.to_string(), value);
    Value::Object(map)
}
