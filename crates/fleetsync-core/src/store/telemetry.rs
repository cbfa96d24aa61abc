// ── Telemetry ring buffer ──
//
// Bounded per-entity history of numeric metrics. Each entity gets its own
// FIFO buffer on first use; appending past capacity evicts from the front.
// Points are immutable once stored and handed out behind `Arc`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::bus::Event;

/// One timestamped sample of an entity's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPoint {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
}

impl TelemetryPoint {
    pub fn new(
        entity_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            metrics,
        }
    }

    /// Extract a point from a `telemetry` event.
    ///
    /// The entity comes from `entity_id` (or `robot_id`). Metrics come from a
    /// `metrics` object when present, otherwise from the top-level numeric
    /// fields. Non-numeric values are skipped. Returns `None` when no entity
    /// id can be found.
    pub fn from_event(event: &Event) -> Option<Self> {
        let data = event.data.as_object()?;
        let entity_id = data
            .get("entity_id")
            .or_else(|| data.get("robot_id"))
            .and_then(Value::as_str)?;

        let source = data
            .get("metrics")
            .and_then(Value::as_object)
            .unwrap_or(data);
        let metrics = source
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
            .collect();

        Some(Self::new(entity_id, event.timestamp, metrics))
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Per-entity ring buffers of [`TelemetryPoint`]s.
#[derive(Debug)]
pub struct TelemetryStore {
    capacity: AtomicUsize,
    buffers: DashMap<String, VecDeque<Arc<TelemetryPoint>>>,
    version: watch::Sender<u64>,
}

impl TelemetryStore {
    pub fn new(capacity: usize) -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            capacity: AtomicUsize::new(capacity),
            buffers: DashMap::new(),
            version,
        }
    }

    /// Store a point, evicting the entity's oldest points beyond capacity.
    pub fn append(&self, point: TelemetryPoint) {
        let capacity = self.capacity();
        {
            let mut buffer = self.buffers.entry(point.entity_id.clone()).or_default();
            buffer.push_back(Arc::new(point));
            while buffer.len() > capacity {
                buffer.pop_front();
            }
        }
        self.version.send_modify(|v| *v += 1);
    }

    /// Snapshot of an entity's history, oldest first. Empty for unknown
    /// entities.
    pub fn read(&self, entity_id: &str) -> Vec<Arc<TelemetryPoint>> {
        self.buffers
            .get(entity_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, entity_id: &str) -> Option<Arc<TelemetryPoint>> {
        self.buffers
            .get(entity_id)
            .and_then(|buffer| buffer.back().cloned())
    }

    /// Entities with at least one stored point, sorted.
    pub fn entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.buffers.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self, entity_id: &str) -> usize {
        self.buffers.get(entity_id).map_or(0, |buffer| buffer.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Change the per-entity bound. Existing buffers are trimmed on their
    /// next append, not immediately.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.buffers.clear();
        self.version.send_modify(|v| *v += 1);
    }

    /// Receiver whose value bumps on every mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}
