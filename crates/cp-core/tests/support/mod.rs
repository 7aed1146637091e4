//! Scripted datastore for probe scenario tests.
//!
//! Each read of a trial record counts toward that record's visibility; the
//! script decides on which read it shows up and which calls fail.

#![allow(dead_code)]
// Test support provides more knobs than any single test uses.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use cp_common::{ReadStrategy, RunPrefix};
use cp_core::probe::ProbeOptions;
use cp_core::store::{Datastore, Entity, Key, KindStat, Query, StoreError};

/// What the store does, fixed up front.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Read (per record, 1-based) on which a record first appears. 0 = never.
    pub visible_on_read: u32,
    /// Ordinals (0-based, trial puts only) whose put fails.
    pub failing_puts: Vec<u32>,
    pub fail_ancestor: bool,
    /// Global read number (1-based) that fails with `Unavailable`.
    pub failing_read: Option<u32>,
    /// Reads before visibility return a stale value instead of nothing.
    pub stale_values: bool,
    pub reject_queries: bool,
    /// Query reads (per record, 1-based) up to this one return the record twice.
    pub duplicated_reads: u32,
}

impl Script {
    pub fn visible_on(read: u32) -> Self {
        Script {
            visible_on_read: read,
            ..Script::default()
        }
    }
}

#[derive(Default)]
struct State {
    records: BTreeMap<Key, Entity>,
    reads_per_record: BTreeMap<Key, u32>,
    trial_puts: u32,
    ancestor_puts: u32,
    total_reads: u32,
    lookups: u32,
    queries: Vec<Query>,
}

pub struct ScriptedStore {
    script: Script,
    state: Mutex<State>,
}

impl ScriptedStore {
    pub fn new(script: Script) -> Self {
        ScriptedStore {
            script,
            state: Mutex::new(State::default()),
        }
    }

    pub fn trial_puts(&self) -> u32 {
        self.state.lock().unwrap().trial_puts
    }

    pub fn ancestor_puts(&self) -> u32 {
        self.state.lock().unwrap().ancestor_puts
    }

    pub fn lookups(&self) -> u32 {
        self.state.lock().unwrap().lookups
    }

    pub fn queries(&self) -> Vec<Query> {
        self.state.lock().unwrap().queries.clone()
    }

    fn start_read(&self, state: &mut State) -> Result<(), StoreError> {
        state.total_reads += 1;
        if self.script.failing_read == Some(state.total_reads) {
            return Err(StoreError::Unavailable(format!(
                "scripted failure on read {}",
                state.total_reads
            )));
        }
        Ok(())
    }

    /// Count a read of `key` and return what it sees.
    fn observe(&self, state: &mut State, key: &Key) -> Option<Entity> {
        let entity = state.records.get(key)?.clone();
        let reads = state.reads_per_record.entry(key.clone()).or_insert(0);
        *reads += 1;

        let visible = self.script.visible_on_read != 0 && *reads >= self.script.visible_on_read;
        if visible {
            Some(entity)
        } else if self.script.stale_values {
            Some(entity.with_property("value", "stale"))
        } else {
            None
        }
    }
}

fn is_ancestor(entity: &Entity) -> bool {
    entity
        .key
        .name()
        .is_some_and(|name| name.ends_with("name-root"))
}

impl Datastore for ScriptedStore {
    fn put(&self, entity: Entity) -> Result<Key, StoreError> {
        let mut state = self.state.lock().unwrap();
        if is_ancestor(&entity) {
            state.ancestor_puts += 1;
            if self.script.fail_ancestor {
                return Err(StoreError::Injected("ancestor put".to_string()));
            }
        } else {
            let ordinal = state.trial_puts;
            state.trial_puts += 1;
            if self.script.failing_puts.contains(&ordinal) {
                return Err(StoreError::Injected(format!("put {}", ordinal)));
            }
        }

        let key = entity.key.clone();
        state.records.insert(key.clone(), entity);
        Ok(key)
    }

    fn get(&self, key: &Key) -> Result<Entity, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        self.start_read(&mut state)?;
        self.observe(&mut state, key)
            .ok_or_else(|| StoreError::NoSuchEntity {
                key: key.to_string(),
            })
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Entity>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());
        if self.script.reject_queries {
            return Err(StoreError::InvalidQuery("scripted rejection".to_string()));
        }
        self.start_read(&mut state)?;

        let keys: Vec<Key> = state
            .records
            .values()
            .filter(|entity| query.matches(entity))
            .map(|entity| entity.key.clone())
            .collect();
        let mut found = Vec::new();
        for key in keys {
            if let Some(entity) = self.observe(&mut state, &key) {
                // Stale reads still have to satisfy the filter.
                if query.matches(&entity) {
                    let entity = if query.projection.is_empty() {
                        entity
                    } else {
                        entity.project(&query.projection)
                    };
                    let reads = state.reads_per_record.get(&key).copied().unwrap_or(0);
                    if reads <= self.script.duplicated_reads {
                        found.push(entity.clone());
                    }
                    found.push(entity);
                }
            }
        }
        Ok(found)
    }

    fn kind_stat(&self, _kind: &str) -> Result<Option<KindStat>, StoreError> {
        Ok(None)
    }
}

pub fn options(strategy: ReadStrategy, trials: u32, max_attempts: u32) -> ProbeOptions {
    ProbeOptions {
        strategy,
        kind: "testkind".to_string(),
        trial_count: trials,
        attempt_delay: Duration::ZERO,
        max_attempts,
    }
}

pub fn prefix() -> RunPrefix {
    RunPrefix::from_raw("2026-10-18 09:15:00.000042 ")
}
