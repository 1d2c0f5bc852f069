//! # Unit of Work
//!
//! Per-operation scoped state: entity cache, mutation ledger (updated /
//! deleted headers), propagation ledger (added / removed classifications per
//! entity), request metadata and optional timing metrics.
//!
//! One `UnitOfWork` belongs to exactly one logical operation and is passed
//! explicitly to every engine call. Each unit registers itself in an
//! [`ActiveUnits`] arena on creation and deregisters when dropped, so callers
//! can ask for the oldest in-flight request.
//!
//! ```text
//! begin ──► engines record into ledgers ──► notifier drains ──► clear (drop)
//! ```

pub mod context;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CoreConfig;
use crate::model::{Classification, Entity, EntityHeader, Guid};

// ============================================================================
// DeleteType
// ============================================================================

/// Per-operation override of the configured soft-delete policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeleteType {
    /// Follow `CoreConfig::soft_delete_enabled`.
    #[default]
    Default,
    Soft,
    Hard,
}

impl DeleteType {
    /// Effective soft-delete flag given the configured default.
    pub fn is_soft(self, configured: bool) -> bool {
        match self {
            DeleteType::Default => configured,
            DeleteType::Soft => true,
            DeleteType::Hard => false,
        }
    }
}

// ============================================================================
// ActiveUnits: arena of live units
// ============================================================================

/// Process-wide registry of live units of work, keyed by operation id.
///
/// Only registration and removal take the lock; nothing outside the arena
/// ever holds a reference into it.
#[derive(Debug, Default)]
pub struct ActiveUnits {
    units: Mutex<HashMap<u64, DateTime<Utc>>>,
    next_id: AtomicU64,
}

impl ActiveUnits {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The shared process-wide arena.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ActiveUnits>> = OnceLock::new();
        GLOBAL.get_or_init(ActiveUnits::new).clone()
    }

    fn register(&self, request_time: DateTime<Utc>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.units.lock().insert(id, request_time);
        id
    }

    fn deregister(&self, id: u64) {
        self.units.lock().remove(&id);
    }

    pub fn active_count(&self) -> usize {
        self.units.lock().len()
    }

    /// Start time of the oldest live unit; now when none are live.
    pub fn earliest_active_request_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.units
            .lock()
            .values()
            .copied()
            .min()
            .map_or(now, |earliest| earliest.min(now))
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// In-flight timing of one named step.
#[derive(Debug)]
pub struct MetricRecorder {
    name: &'static str,
    started: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricStat {
    pub invocations: u64,
    pub total: Duration,
}

/// Aggregated step timings for one operation.
#[derive(Debug, Default)]
pub struct PerfMetrics {
    stats: BTreeMap<&'static str, MetricStat>,
}

impl PerfMetrics {
    fn record(&mut self, recorder: MetricRecorder) {
        let stat = self.stats.entry(recorder.name).or_default();
        stat.invocations += 1;
        stat.total += recorder.started.elapsed();
    }

    pub fn get(&self, name: &str) -> Option<MetricStat> {
        self.stats.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

// ============================================================================
// UnitOfWork
// ============================================================================

/// Per-operation cache and ledgers.
#[derive(Debug)]
pub struct UnitOfWork {
    id: u64,
    units: Arc<ActiveUnits>,
    request_time: DateTime<Utc>,

    updated: HashMap<Guid, EntityHeader>,
    deleted: HashMap<Guid, EntityHeader>,
    entity_cache: HashMap<Guid, Entity>,
    added_propagations: BTreeMap<Guid, Vec<Classification>>,
    removed_propagations: BTreeMap<Guid, Vec<Classification>>,
    metrics: Option<PerfMetrics>,

    pub user: Option<String>,
    pub user_groups: HashSet<String>,
    pub client_ip: Option<String>,
    pub delete_type: DeleteType,
    pub max_attempts: u32,
    pub attempt_count: u32,
    pub import_in_progress: bool,
    pub in_notification_processing: bool,
    pub in_type_patching: bool,
}

impl UnitOfWork {
    /// Open a unit and register it in `units`.
    pub fn begin(units: &Arc<ActiveUnits>) -> Self {
        let request_time = Utc::now();
        let id = units.register(request_time);
        debug!(uow = id, "unit of work opened");
        Self {
            id,
            units: Arc::clone(units),
            request_time,
            updated: HashMap::new(),
            deleted: HashMap::new(),
            entity_cache: HashMap::new(),
            added_propagations: BTreeMap::new(),
            removed_propagations: BTreeMap::new(),
            metrics: None,
            user: None,
            user_groups: HashSet::new(),
            client_ip: None,
            delete_type: DeleteType::Default,
            max_attempts: 1,
            attempt_count: 1,
            import_in_progress: false,
            in_notification_processing: false,
            in_type_patching: false,
        }
    }

    /// Turn per-step timing on for this unit.
    pub fn with_metrics(mut self) -> Self {
        self.metrics = Some(PerfMetrics::default());
        self
    }

    pub fn with_user(
        mut self,
        user: impl Into<String>,
        groups: impl IntoIterator<Item = String>,
    ) -> Self {
        self.user = Some(user.into());
        self.user_groups = groups.into_iter().collect();
        self
    }

    pub fn with_delete_type(mut self, delete_type: DeleteType) -> Self {
        self.delete_type = delete_type;
        self
    }

    /// Apply the configured defaults: metrics when `metrics_enabled` is set.
    pub fn configured(self, config: &CoreConfig) -> Self {
        if config.metrics_enabled {
            self.with_metrics()
        } else {
            self
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
    }

    /// User stamped into `__modifiedBy`; empty when unauthenticated.
    pub fn user_name(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    // ==================== Mutation ledger ====================

    pub fn record_entity_update(&mut self, header: EntityHeader) {
        self.updated.insert(header.guid, header);
    }

    pub fn record_entity_delete(&mut self, header: EntityHeader) {
        self.deleted.insert(header.guid, header);
    }

    pub fn is_updated_entity(&self, guid: Guid) -> bool {
        self.updated.contains_key(&guid)
    }

    pub fn is_deleted_entity(&self, guid: Guid) -> bool {
        self.deleted.contains_key(&guid)
    }

    pub fn updated_entities(&self) -> impl Iterator<Item = &EntityHeader> {
        self.updated.values()
    }

    pub fn deleted_entities(&self) -> impl Iterator<Item = &EntityHeader> {
        self.deleted.values()
    }

    // ==================== Propagation ledger ====================

    pub fn record_added_propagation(&mut self, guid: Guid, classification: Classification) {
        self.added_propagations.entry(guid).or_default().push(classification);
    }

    pub fn record_removed_propagation(&mut self, guid: Guid, classification: Classification) {
        self.removed_propagations.entry(guid).or_default().push(classification);
    }

    pub fn added_propagations(&self) -> &BTreeMap<Guid, Vec<Classification>> {
        &self.added_propagations
    }

    pub fn removed_propagations(&self) -> &BTreeMap<Guid, Vec<Classification>> {
        &self.removed_propagations
    }

    /// Drain the added-propagation ledger.
    pub fn take_added_propagations(&mut self) -> BTreeMap<Guid, Vec<Classification>> {
        std::mem::take(&mut self.added_propagations)
    }

    /// Drain the removed-propagation ledger.
    pub fn take_removed_propagations(&mut self) -> BTreeMap<Guid, Vec<Classification>> {
        std::mem::take(&mut self.removed_propagations)
    }

    // ==================== Entity cache ====================

    pub fn cache(&mut self, entity: Entity) {
        self.entity_cache.insert(entity.guid, entity);
    }

    pub fn cached_entity(&self, guid: Guid) -> Option<&Entity> {
        self.entity_cache.get(&guid)
    }

    // ==================== Metrics ====================

    /// Start timing `name`. `None` when metrics are off for this unit.
    pub fn start_metric(&self, name: &'static str) -> Option<MetricRecorder> {
        self.metrics
            .as_ref()
            .map(|_| MetricRecorder { name, started: Instant::now() })
    }

    pub fn end_metric(&mut self, recorder: Option<MetricRecorder>) {
        if let (Some(metrics), Some(recorder)) = (self.metrics.as_mut(), recorder) {
            metrics.record(recorder);
        }
    }

    pub fn metrics(&self) -> Option<&PerfMetrics> {
        self.metrics.as_ref()
    }

    /// End of operation: flush metrics, drop every ledger, deregister.
    pub fn clear(mut self) {
        if let Some(metrics) = self.metrics.take().filter(|m| !m.is_empty()) {
            for (name, stat) in &metrics.stats {
                debug!(
                    target: "metrics",
                    uow = self.id,
                    step = name,
                    invocations = stat.invocations,
                    total_us = stat.total.as_micros() as u64,
                    "step timing"
                );
            }
        }
        self.updated.clear();
        self.deleted.clear();
        self.entity_cache.clear();
        self.added_propagations.clear();
        self.removed_propagations.clear();
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.units.deregister(self.id);
    }
}
