//! Named-cache lifecycle registry.
//!
//! Tracks every cache name a manager knows about together with its lifecycle
//! state and configuration reference. Mutations of one name are serialised by
//! that entry's shard lock; unrelated names proceed in parallel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge};
use tracing::{debug, info};

use super::config::ConfigurationRef;
use super::record::{CacheEntryRecord, CacheName, LifecycleState};
use super::render;

pub(crate) const METRIC_CACHE_CREATED: &str = "cachemgr_cache_created_total";
pub(crate) const METRIC_CACHE_START: &str = "cachemgr_cache_start_total";
pub(crate) const METRIC_CACHE_STOP: &str = "cachemgr_cache_stop_total";
pub(crate) const METRIC_RUNNING_CACHES: &str = "cachemgr_running_caches";

/// Handle to a running cache.
///
/// Starting an already running cache hands back a clone of the same handle;
/// a stop followed by a start produces a new one.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    name: CacheName,
    incarnation: u64,
}

impl CacheHandle {
    fn new(name: CacheName, incarnation: u64) -> Self {
        Self {
            inner: Arc::new(HandleInner { name, incarnation }),
        }
    }

    pub fn name(&self) -> &CacheName {
        &self.inner.name
    }

    /// How many times this name had been started when the handle was issued.
    pub fn incarnation(&self) -> u64 {
        self.inner.incarnation
    }

    pub fn same_instance(&self, other: &CacheHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

struct CacheSlot {
    configuration: ConfigurationRef,
    /// Present while the cache is running.
    handle: Option<CacheHandle>,
    incarnations: u64,
}

impl CacheSlot {
    fn defined(configuration: ConfigurationRef) -> Self {
        Self {
            configuration,
            handle: None,
            incarnations: 0,
        }
    }

    fn state(&self) -> LifecycleState {
        if self.handle.is_some() {
            LifecycleState::Running
        } else {
            LifecycleState::Defined
        }
    }

    fn to_record(&self, name: &CacheName) -> CacheEntryRecord {
        CacheEntryRecord {
            name: name.clone(),
            state: self.state(),
            configuration: Arc::clone(&self.configuration),
        }
    }
}

/// Consistent point-in-time view of a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Distinct names started at least once since the manager came up.
    pub created_count: u64,
    /// Named (non-default) caches that are defined or running, keyed by name,
    /// mapped to their rendered `name(summary)` form.
    pub defined_names: BTreeMap<String, String>,
    /// Caches currently running, the default cache included.
    pub running_count: u64,
}

impl RegistrySnapshot {
    pub fn defined_count(&self) -> u64 {
        self.defined_names.len() as u64
    }

    /// Bracketed list of rendered defined names.
    pub fn rendered_defined_names(&self) -> String {
        render::bracketed(self.defined_names.values())
    }
}

pub struct CacheRegistry {
    records: DashMap<CacheName, CacheSlot>,
    created: AtomicU64,
    default_configuration: ConfigurationRef,
}

impl CacheRegistry {
    /// Create an empty registry; `default_configuration` is used when a
    /// cache is started without having been defined.
    pub fn new(default_configuration: ConfigurationRef) -> Self {
        Self {
            records: DashMap::new(),
            created: AtomicU64::new(0),
            default_configuration,
        }
    }

    pub fn default_configuration(&self) -> &ConfigurationRef {
        &self.default_configuration
    }

    /// Create or replace the configuration of `name`.
    ///
    /// A new record is `Defined`. A running cache keeps running and keeps its
    /// handle; only the configuration reference changes.
    pub fn define(&self, name: CacheName, configuration: ConfigurationRef) {
        match self.records.entry(name) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.configuration = configuration;
                let state = slot.state();
                debug!(cache = %occupied.key(), %state, "Cache configuration replaced");
            }
            Entry::Vacant(vacant) => {
                debug!(cache = %vacant.key(), "Cache defined");
                vacant.insert(CacheSlot::defined(configuration));
            }
        }
    }

    /// Start `name`, defining it with the default configuration if needed.
    pub fn start(&self, name: CacheName) -> CacheHandle {
        let mut slot = self
            .records
            .entry(name.clone())
            .or_insert_with(|| CacheSlot::defined(Arc::clone(&self.default_configuration)));

        if let Some(handle) = &slot.handle {
            return handle.clone();
        }

        // Counted before the slot turns Running so that any snapshot seeing
        // the running state also sees the creation.
        let first_start = slot.incarnations == 0;
        if first_start {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        slot.incarnations += 1;
        let handle = CacheHandle::new(name, slot.incarnations);
        slot.handle = Some(handle.clone());
        drop(slot);

        if first_start {
            counter!(METRIC_CACHE_CREATED).increment(1);
        }
        counter!(METRIC_CACHE_START).increment(1);
        gauge!(METRIC_RUNNING_CACHES).increment(1.0);
        info!(
            cache = %handle.name(),
            incarnation = handle.incarnation(),
            first_start,
            "Cache started"
        );

        handle
    }

    /// Stop `name`. Returns `false` when it was not running.
    pub fn stop(&self, name: &CacheName) -> bool {
        let Some(mut slot) = self.records.get_mut(name) else {
            return false;
        };
        let Some(handle) = slot.handle.take() else {
            return false;
        };
        drop(slot);

        counter!(METRIC_CACHE_STOP).increment(1);
        gauge!(METRIC_RUNNING_CACHES).decrement(1.0);
        info!(
            cache = %name,
            incarnation = handle.incarnation(),
            "Cache stopped"
        );
        true
    }

    /// Stop every running cache, returning how many were stopped.
    pub fn stop_all(&self) -> usize {
        let running: Vec<CacheName> = self
            .records
            .iter()
            .filter(|entry| entry.handle.is_some())
            .map(|entry| entry.key().clone())
            .collect();

        running.iter().filter(|name| self.stop(name)).count()
    }

    pub fn state(&self, name: &CacheName) -> LifecycleState {
        self.records
            .get(name)
            .map(|slot| slot.state())
            .unwrap_or(LifecycleState::Undefined)
    }

    /// Copies of every record, ordered by name.
    pub fn records(&self) -> Vec<CacheEntryRecord> {
        let mut records: Vec<CacheEntryRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().to_record(entry.key()))
            .collect();
        records.sort_by(|left, right| left.name.cmp(&right.name));
        records
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut defined_names = BTreeMap::new();
        let mut running_count = 0;

        for entry in self.records.iter() {
            let record = entry.value().to_record(entry.key());
            if record.state == LifecycleState::Running {
                running_count += 1;
            }
            if let CacheName::Named(name) = &record.name {
                defined_names.insert(name.clone(), render::name_with_parameters(&record));
            }
        }

        // Read after the pass: creations are counted before a slot turns
        // Running, so created_count >= running_count holds.
        let created_count = self.created.load(Ordering::SeqCst);

        RegistrySnapshot {
            created_count,
            defined_names,
            running_count,
        }
    }

    /// Destroy every record. Only used when the owning manager is torn down.
    pub(crate) fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use super::*;
    use crate::cache::config::{BasicConfiguration, CacheConfiguration, CacheMode};

    fn registry() -> CacheRegistry {
        CacheRegistry::new(BasicConfiguration::default().into_ref())
    }

    fn dist_config() -> ConfigurationRef {
        BasicConfiguration {
            mode: CacheMode::DistSync,
            ..Default::default()
        }
        .into_ref()
    }

    #[test]
    fn empty_registry_snapshot() {
        let snapshot = registry().snapshot();
        assert_eq!(snapshot, RegistrySnapshot::default());
        assert_eq!(snapshot.rendered_defined_names(), "[]");
    }

    #[test]
    fn default_cache_runs_without_being_defined() {
        let registry = registry();
        registry.start(CacheName::Default);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.created_count, 1);
        assert_eq!(snapshot.defined_count(), 0);
        assert_eq!(snapshot.running_count, 1);
        assert_eq!(registry.state(&CacheName::Default), LifecycleState::Running);
    }

    #[test]
    fn define_does_not_start() {
        let registry = registry();
        registry.define(CacheName::named("a"), dist_config());

        assert_eq!(registry.state(&CacheName::named("a")), LifecycleState::Defined);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.defined_count(), 1);
        assert_eq!(snapshot.running_count, 0);
        assert_eq!(snapshot.created_count, 0);
        assert!(snapshot.defined_names["a"].starts_with("a(mode=dist_sync"));
    }

    #[test]
    fn start_of_undefined_name_defines_it() {
        let registry = registry();
        assert_eq!(registry.state(&CacheName::named("x")), LifecycleState::Undefined);

        registry.start(CacheName::named("x"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.defined_count(), 1);
        assert_eq!(snapshot.running_count, 1);
        assert_eq!(snapshot.created_count, 1);
    }

    #[test]
    fn starting_a_running_cache_returns_same_handle() {
        let registry = registry();
        let first = registry.start(CacheName::named("a"));
        let second = registry.start(CacheName::named("a"));

        assert!(first.same_instance(&second));
        assert_eq!(registry.snapshot().created_count, 1);
    }

    #[test]
    fn restart_does_not_count_as_creation() {
        let registry = registry();
        let first = registry.start(CacheName::named("a"));
        let before = registry.snapshot();

        assert!(registry.stop(&CacheName::named("a")));
        assert_eq!(registry.snapshot().running_count, before.running_count - 1);

        let second = registry.start(CacheName::named("a"));
        let after = registry.snapshot();
        assert_eq!(after.created_count, before.created_count);
        assert_eq!(after.running_count, before.running_count);
        assert!(!first.same_instance(&second));
        assert_eq!(second.incarnation(), 2);
    }

    #[test]
    fn stop_of_idle_cache_is_noop() {
        let registry = registry();
        assert!(!registry.stop(&CacheName::named("missing")));

        registry.define(CacheName::named("a"), dist_config());
        assert!(!registry.stop(&CacheName::named("a")));
        assert_eq!(registry.state(&CacheName::named("a")), LifecycleState::Defined);
    }

    #[test]
    fn redefining_running_cache_keeps_it_running() {
        let registry = registry();
        let handle = registry.start(CacheName::named("a"));

        registry.define(CacheName::named("a"), dist_config());

        assert_eq!(registry.state(&CacheName::named("a")), LifecycleState::Running);
        assert!(registry.start(CacheName::named("a")).same_instance(&handle));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.running_count, 1);
        assert_eq!(
            snapshot.defined_names["a"],
            format!("a({})", dist_config().summary())
        );
    }

    #[test]
    fn stop_all_leaves_records_defined() {
        let registry = registry();
        registry.start(CacheName::Default);
        registry.start(CacheName::named("a"));
        registry.define(CacheName::named("b"), dist_config());

        assert_eq!(registry.stop_all(), 2);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.running_count, 0);
        assert_eq!(snapshot.defined_count(), 2);

        let states: Vec<_> = registry.records().into_iter().map(|r| r.state).collect();
        assert!(states.iter().all(|state| *state == LifecycleState::Defined));
    }

    #[test]
    fn concurrent_starts_of_one_name_create_once() {
        let registry = registry();

        let handles: Vec<CacheHandle> = thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.start(CacheName::named("shared"))))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker panicked"))
                .collect()
        });

        assert!(handles.windows(2).all(|pair| pair[0].same_instance(&pair[1])));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.created_count, 1);
        assert_eq!(snapshot.running_count, 1);
    }

    #[test]
    fn concurrent_starts_of_distinct_names() {
        let registry = registry();

        thread::scope(|scope| {
            for index in 0..16 {
                let registry = &registry;
                scope.spawn(move || {
                    registry.start(CacheName::named(format!("cache-{index}")));
                });
            }
        });

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.created_count, 16);
        assert_eq!(snapshot.running_count, 16);
        assert_eq!(snapshot.defined_count(), 16);
    }

    #[test]
    fn snapshots_stay_consistent_under_concurrent_churn() {
        let registry = registry();
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            let observer = scope.spawn(|| {
                let mut observed = 0_u64;
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    let snapshot = registry.snapshot();
                    assert!(
                        snapshot.created_count >= snapshot.running_count,
                        "created {} < running {}",
                        snapshot.created_count,
                        snapshot.running_count
                    );
                    // Only the default cache may run without a defined name.
                    assert!(snapshot.running_count <= snapshot.defined_count() + 1);
                    observed += 1;
                    if finished {
                        break observed;
                    }
                }
            });

            let workers: Vec<_> = (0..4)
                .map(|worker| {
                    let registry = &registry;
                    scope.spawn(move || {
                        for round in 0..500 {
                            let name = if round % 7 == 0 {
                                CacheName::Default
                            } else {
                                CacheName::named(format!("churn-{}", (worker + round) % 5))
                            };
                            registry.start(name.clone());
                            if round % 2 == 0 {
                                registry.stop(&name);
                            }
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().expect("worker panicked");
            }
            done.store(true, Ordering::SeqCst);

            assert!(observer.join().expect("observer panicked") > 0);
        });

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.created_count, 6);
        assert!(snapshot.running_count <= 6);
    }
}
