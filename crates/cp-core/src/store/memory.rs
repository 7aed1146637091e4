//! In-process datastore with simulated replication lag.
//!
//! Each key holds a committed version (what eventually-consistent reads
//! return) and at most one pending version (written but not yet
//! replicated). A pending version is promoted once the configured
//! [`Visibility`] allows it. Ancestor-scoped queries read the latest
//! version directly unless ancestor consistency is turned off.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use cp_config::{StoreConfig, VisibilityConfig, VisibilityMode};

use super::{Datastore, Entity, Key, KeyId, KindStat, Query, StoreError};

/// When a pending write becomes visible to eventually-consistent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Immediate,
    /// On the N-th read that targets the record (lookups of its key, or
    /// queries it matches).
    AfterReads(u32),
    /// Once this much time has passed since the write.
    AfterMillis(Duration),
    Never,
}

impl Visibility {
    pub fn from_config(config: &VisibilityConfig) -> Self {
        match config.mode {
            VisibilityMode::Immediate => Visibility::Immediate,
            VisibilityMode::AfterReads => Visibility::AfterReads(config.reads.unwrap_or(1)),
            VisibilityMode::AfterMillis => {
                Visibility::AfterMillis(Duration::from_millis(config.millis.unwrap_or(0)))
            }
            VisibilityMode::Never => Visibility::Never,
        }
    }

    fn allows(&self, reads: u32, age: Duration) -> bool {
        match *self {
            Visibility::Immediate => true,
            Visibility::AfterReads(n) => reads >= n,
            Visibility::AfterMillis(lag) => age >= lag,
            Visibility::Never => false,
        }
    }
}

#[derive(Debug)]
struct Pending {
    entity: Entity,
    written: Instant,
    reads: u32,
}

#[derive(Debug, Default)]
struct Slot {
    committed: Option<Entity>,
    pending: Option<Pending>,
}

impl Slot {
    /// Version seen by an eventually-consistent read. `targeted` reads count
    /// towards [`Visibility::AfterReads`].
    fn observe(&mut self, visibility: Visibility, targeted: bool) -> Option<&Entity> {
        let promote = match self.pending.as_mut() {
            Some(pending) => {
                if targeted {
                    pending.reads += 1;
                }
                visibility.allows(pending.reads, pending.written.elapsed())
            }
            None => false,
        };
        if promote {
            self.commit();
        }
        self.committed.as_ref()
    }

    /// Strongly consistent read: replicates any pending version first.
    fn latest(&mut self) -> Option<&Entity> {
        self.commit();
        self.committed.as_ref()
    }

    fn commit(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.committed = Some(pending.entity);
        }
    }

    fn pending_matches(&self, query: &Query) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| query.matches(&pending.entity))
    }
}

#[derive(Debug, Default)]
struct State {
    slots: BTreeMap<Key, Slot>,
    next_id: u64,
}

/// Thread-safe in-memory [`Datastore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    visibility: Visibility,
    ancestor_consistent: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Visibility::Immediate)
    }
}

impl MemoryStore {
    pub fn new(visibility: Visibility) -> Self {
        MemoryStore {
            state: Mutex::new(State {
                slots: BTreeMap::new(),
                next_id: 1,
            }),
            visibility,
            ancestor_consistent: true,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(Visibility::from_config(&config.visibility))
            .with_ancestor_consistency(config.ancestor_consistent)
    }

    /// Whether ancestor-scoped queries bypass the replication lag.
    pub fn with_ancestor_consistency(mut self, enabled: bool) -> Self {
        self.ancestor_consistent = enabled;
        self
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn check_complete(key: &Key) -> Result<(), StoreError> {
    let mut current = Some(key);
    while let Some(k) = current {
        if k.kind.trim().is_empty() {
            return Err(StoreError::InvalidKey(format!("{} has an empty kind", key)));
        }
        if !k.is_complete() {
            return Err(StoreError::InvalidKey(format!("{} is incomplete", key)));
        }
        current = k.parent.as_deref();
    }
    Ok(())
}

impl Datastore for MemoryStore {
    fn put(&self, mut entity: Entity) -> Result<Key, StoreError> {
        let mut state = self.lock()?;

        if entity.key.id.is_none() {
            entity.key.id = Some(KeyId::Id(state.next_id));
            state.next_id += 1;
        }
        check_complete(&entity.key)?;

        let key = entity.key.clone();
        let slot = state.slots.entry(key.clone()).or_default();
        if self.visibility == Visibility::Immediate {
            slot.pending = None;
            slot.committed = Some(entity);
        } else {
            slot.pending = Some(Pending {
                entity,
                written: Instant::now(),
                reads: 0,
            });
        }
        Ok(key)
    }

    fn get(&self, key: &Key) -> Result<Entity, StoreError> {
        check_complete(key)?;
        let mut state = self.lock()?;
        let found = state
            .slots
            .get_mut(key)
            .and_then(|slot| slot.observe(self.visibility, true))
            .cloned();
        found.ok_or_else(|| StoreError::NoSuchEntity {
            key: key.to_string(),
        })
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Entity>, StoreError> {
        query.validate()?;
        let strong_scope = query.ancestor.as_ref().filter(|_| self.ancestor_consistent);
        let limit = query.limit.unwrap_or(usize::MAX);

        let mut state = self.lock()?;
        let mut results = Vec::new();
        // Slots iterate in key order, so results are always key ordered.
        for (key, slot) in state.slots.iter_mut() {
            if results.len() >= limit {
                break;
            }
            // Only the queried entity group is read strongly.
            let in_scope = strong_scope.is_some_and(|ancestor| key.has_ancestor(ancestor));
            let visible = if in_scope {
                slot.latest()
            } else {
                let targeted = slot.pending_matches(query);
                slot.observe(self.visibility, targeted)
            };
            let Some(entity) = visible else { continue };
            if !query.matches(entity) {
                continue;
            }
            if query.keys_only {
                results.push(entity.key_only());
            } else if !query.projection.is_empty() {
                results.push(entity.project(&query.projection));
            } else {
                results.push(entity.clone());
            }
        }
        Ok(results)
    }

    fn kind_stat(&self, kind: &str) -> Result<Option<KindStat>, StoreError> {
        let state = self.lock()?;
        let (count, bytes) = state
            .slots
            .values()
            .filter_map(|slot| slot.committed.as_ref())
            .filter(|entity| entity.key.kind == kind)
            .fold((0u64, 0u64), |(count, bytes), entity| {
                (count + 1, bytes + entity.size_bytes())
            });

        if count == 0 {
            return Ok(None);
        }
        Ok(Some(KindStat {
            kind: kind.to_string(),
            count,
            bytes,
            timestamp: Utc::now(),
        }))
    }
}
