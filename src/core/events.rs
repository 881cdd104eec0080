// Event System for the VWAP Laboratory
// Engine notifications for the render layer: callbacks, broadcast channel, history

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use parking_lot::RwLock;
use uuid::Uuid;

// ============================================================================
// Event Kind / Priority
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LabEventKind {
    TradeIngested,
    TradeRejected,
    AnchorCreated,
    AnchorRemoved,
    TracksRebuilt,
    ReplayStateChanged,
    ReplayComplete,
    ScenarioLoaded,
    ScenarioReset,
    CommandRejected,
}

impl fmt::Display for LabEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EventPriority {
    High = 1,    // Rejections, rebuilds
    Medium = 2,  // Anchor lifecycle, replay state
    Low = 3,     // Per-trade notifications
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Event
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LabEvent {
    pub kind: LabEventKind,
    pub timestamp_ms: i64,
    pub data: HashMap<String, serde_json::Value>,
    pub priority: EventPriority,
    pub event_id: String,
}

impl LabEvent {
    pub fn new(kind: LabEventKind, data: HashMap<String, serde_json::Value>, priority: EventPriority) -> Self {
        Self {
            kind,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            data,
            priority,
            event_id: Uuid::new_v4().to_string(),
        }
    }

    /// Build an event from a `json!({...})` object; non-object payloads are stored under "value"
    pub fn from_json(kind: LabEventKind, payload: serde_json::Value, priority: EventPriority) -> Self {
        let data = match payload {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            serde_json::Value::Null => HashMap::new(),
            other => HashMap::from([("value".to_string(), other)]),
        };
        Self::new(kind, data, priority)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

impl fmt::Display for LabEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LabEvent(kind={}, priority={:?}, id={})",
            self.kind,
            self.priority,
            &self.event_id[..8]
        )
    }
}

// ============================================================================
// Event Bus
// ============================================================================

type EventCallback = Arc<dyn Fn(&LabEvent) + Send + Sync>;

pub struct EventBus {
    tx: broadcast::Sender<LabEvent>,
    subscribers: RwLock<HashMap<LabEventKind, Vec<EventCallback>>>,
    wildcard_subscribers: RwLock<Vec<EventCallback>>,
    event_history: RwLock<VecDeque<LabEvent>>,
    max_history: usize,
    stats: RwLock<EventBusStats>,
}

#[derive(Debug, Clone, Default)]
struct EventBusStats {
    total_published: u64,
    total_delivered: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024, 1024)
    }

    pub fn with_capacity(channel_capacity: usize, max_history: usize) -> Self {
        let (tx, _rx) = broadcast::channel(channel_capacity.max(1));

        Self {
            tx,
            subscribers: RwLock::new(HashMap::new()),
            wildcard_subscribers: RwLock::new(Vec::new()),
            event_history: RwLock::new(VecDeque::with_capacity(max_history.min(1024))),
            max_history,
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    /// Subscribe a callback to one event kind
    pub fn subscribe<F>(&self, kind: LabEventKind, callback: F)
    where
        F: Fn(&LabEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));

        tracing::debug!(kind = %kind, "Subscribed to lab events");
    }

    /// Subscribe a callback to every event kind
    pub fn subscribe_all<F>(&self, callback: F)
    where
        F: Fn(&LabEvent) + Send + Sync + 'static,
    {
        self.wildcard_subscribers.write().push(Arc::new(callback));
    }

    /// Publish event to all subscribers
    pub fn publish(&self, event: LabEvent) {
        self.stats.write().total_published += 1;

        {
            let mut history = self.event_history.write();
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // No receivers is not an error for a notification channel
        let _ = self.tx.send(event.clone());

        // Snapshot callbacks so a callback may read the bus without deadlocking
        let mut callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        callbacks.extend(self.wildcard_subscribers.read().iter().cloned());

        for callback in &callbacks {
            callback(&event);
        }
        self.stats.write().total_delivered += callbacks.len() as u64;
    }

    /// Get a receiver for all events (broadcast channel)
    pub fn subscribe_channel(&self) -> broadcast::Receiver<LabEvent> {
        self.tx.subscribe()
    }

    /// Most recent events first, optionally filtered by kind
    pub fn get_recent_events(&self, kind: Option<LabEventKind>, limit: Option<usize>) -> Vec<LabEvent> {
        let history = self.event_history.read();
        let limit = limit.unwrap_or(100);

        history
            .iter()
            .rev()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> EventBusStatsSnapshot {
        let stats = self.stats.read();
        let subscribers = self.subscribers.read();
        let wildcard = self.wildcard_subscribers.read();

        EventBusStatsSnapshot {
            total_published: stats.total_published,
            total_delivered: stats.total_delivered,
            subscriber_count: subscribers.values().map(Vec::len).sum::<usize>() + wildcard.len(),
            history_size: self.event_history.read().len(),
        }
    }

    pub fn clear_history(&self) {
        self.event_history.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of event bus statistics
#[derive(Debug, Clone)]
pub struct EventBusStatsSnapshot {
    pub total_published: u64,
    pub total_delivered: u64,
    pub subscriber_count: usize,
    pub history_size: usize,
}
