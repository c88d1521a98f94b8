//! Runtime counters are update-only by contract: the engine increments,
//! callers snapshot. Latency belongs to the transaction listener metrics,
//! not here.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::BTreeMap;

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EntityCounters {
    pub writes: u64,
    pub reads: u64,
    pub deletes: u64,
    pub chunked_writes: u64,
    pub index_entries_written: u64,
    pub index_entries_cleared: u64,
    pub unique_violations: u64,
}

#[derive(Debug, Default)]
struct CounterState {
    entities: BTreeMap<String, EntityCounters>,
}

static STATE: Lazy<Mutex<CounterState>> = Lazy::new(|| Mutex::new(CounterState::default()));

fn with_entity(name: &str, f: impl FnOnce(&mut EntityCounters)) {
    let mut state = STATE.lock();
    f(state.entities.entry(name.to_string()).or_default());
}

pub(crate) fn record_write(entity: &str, chunked: bool) {
    with_entity(entity, |c| {
        c.writes += 1;
        if chunked {
            c.chunked_writes += 1;
        }
    });
}

pub(crate) fn record_read(entity: &str) {
    with_entity(entity, |c| c.reads += 1);
}

pub(crate) fn record_delete(entity: &str) {
    with_entity(entity, |c| c.deletes += 1);
}

pub(crate) fn record_unique_violation(entity: &str) {
    with_entity(entity, |c| c.unique_violations += 1);
}

///
/// EntitySnapshot
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EntitySnapshot {
    pub entity: String,
    pub counters: EntityCounters,
}

/// Snapshot of every entity's counters, sorted by write volume then name.
#[must_use]
pub fn snapshot() -> Vec<EntitySnapshot> {
    let state = STATE.lock();
    let mut out: Vec<EntitySnapshot> = state
        .entities
        .iter()
        .map(|(entity, counters)| EntitySnapshot {
            entity: entity.clone(),
            counters: counters.clone(),
        })
        .collect();
    out.sort_by(|a, b| {
        b.counters
            .writes
            .cmp(&a.counters.writes)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    out
}

/// Reset all counters (useful in tests).
pub fn reset() {
    STATE.lock().entities.clear();
}

///
/// TESTS
///
