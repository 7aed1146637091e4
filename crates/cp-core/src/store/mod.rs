//! Datastore collaborator.
//!
//! The probe only needs a narrow slice of a document store: upsert, lookup
//! by key, single-field equality queries (optionally projected, ancestor
//! scoped, key ordered, keys only), counts, and per-kind statistics.
//! [`Datastore`] is that slice; [`MemoryStore`] is an in-process
//! implementation with configurable replication lag.

pub mod memory;

pub use memory::{MemoryStore, Visibility};

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use cp_common::record::{fields, ProbeRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier part of a key. Numeric ids sort before names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyId {
    Id(u64),
    Name(String),
}

/// Entity key: kind, id, and optional parent.
///
/// A key without an id is incomplete; `put` assigns one. Keys order by
/// parent, then kind, then id, so a parent sorts before its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Key>>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<KeyId>,
}

impl Key {
    /// Complete key with a string name.
    pub fn named(kind: impl Into<String>, name: impl Into<String>, parent: Option<&Key>) -> Self {
        Key {
            parent: parent.map(|p| Box::new(p.clone())),
            kind: kind.into(),
            id: Some(KeyId::Name(name.into())),
        }
    }

    /// Incomplete key; the store assigns a numeric id on `put`.
    pub fn incomplete(kind: impl Into<String>, parent: Option<&Key>) -> Self {
        Key {
            parent: parent.map(|p| Box::new(p.clone())),
            kind: kind.into(),
            id: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.id.is_some()
    }

    /// Name component, if this key is named.
    pub fn name(&self) -> Option<&str> {
        match &self.id {
            Some(KeyId::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// True if `ancestor` is this key or appears on its parent chain.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent.as_deref();
        }
        false
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        match &self.id {
            Some(KeyId::Name(name)) => write!(f, "{}:{:?}", self.kind, name),
            Some(KeyId::Id(id)) => write!(f, "{}:{}", self.kind, id),
            None => write!(f, "{}:?", self.kind),
        }
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Rough stored size, used for kind statistics.
    fn size_bytes(&self) -> u64 {
        match self {
            PropertyValue::Str(s) => s.len() as u64,
            PropertyValue::Int(_) | PropertyValue::Timestamp(_) => 8,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

/// A keyed bag of properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub key: Key,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Entity {
            key,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Entity holding a probe record under `key`.
    pub fn from_record(key: Key, record: &ProbeRecord) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(fields::NAME.to_string(), PropertyValue::Str(record.name.clone()));
        properties.insert(fields::VALUE.to_string(), PropertyValue::Str(record.value.clone()));
        properties.insert(
            fields::CREATED_AT.to_string(),
            PropertyValue::Timestamp(record.created_at),
        );
        properties.insert(
            fields::UPDATED_AT.to_string(),
            PropertyValue::Timestamp(record.updated_at),
        );
        Entity { key, properties }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropertyValue::as_str)
    }

    /// Copy carrying only the named properties.
    pub fn project(&self, names: &[String]) -> Entity {
        Entity {
            key: self.key.clone(),
            properties: self
                .properties
                .iter()
                .filter(|(name, _)| names.iter().any(|n| n == *name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Copy carrying only the key.
    pub fn key_only(&self) -> Entity {
        Entity::new(self.key.clone())
    }

    /// Rough stored size: key names plus property names and values.
    pub fn size_bytes(&self) -> u64 {
        let key_bytes = self.key.to_string().len() as u64;
        self.properties
            .iter()
            .map(|(name, value)| name.len() as u64 + value.size_bytes())
            .sum::<u64>()
            + key_bytes
    }
}

/// Query over one kind.
///
/// Built with chained setters and checked by [`Query::validate`] before it
/// reaches a store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub kind: String,
    pub filter: Option<(String, PropertyValue)>,
    pub projection: Vec<String>,
    pub ancestor: Option<Key>,
    pub order_by_key: bool,
    pub start_after: Option<Key>,
    pub limit: Option<usize>,
    pub keys_only: bool,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Query {
            kind: kind.into(),
            ..Query::default()
        }
    }

    /// Equality filter on a single property.
    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn ancestor(mut self, key: &Key) -> Self {
        self.ancestor = Some(key.clone());
        self
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by_key = true;
        self
    }

    /// Continue after `key` (`__key__ > key`). Requires key order.
    pub fn start_after(mut self, key: &Key) -> Self {
        self.start_after = Some(key.clone());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Reject queries no store could run.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.kind.trim().is_empty() {
            return Err(StoreError::InvalidQuery("kind must not be empty".to_string()));
        }
        if let Some((field, _)) = &self.filter {
            if field.trim().is_empty() {
                return Err(StoreError::InvalidQuery(
                    "filter field must not be empty".to_string(),
                ));
            }
        }
        if self.keys_only && !self.projection.is_empty() {
            return Err(StoreError::InvalidQuery(
                "keys-only queries cannot project properties".to_string(),
            ));
        }
        if self.start_after.is_some() && !self.order_by_key {
            return Err(StoreError::InvalidQuery(
                "a key cursor requires ordering by key".to_string(),
            ));
        }
        if self.limit == Some(0) {
            return Err(StoreError::InvalidQuery("limit must be positive".to_string()));
        }
        if let Some(ancestor) = &self.ancestor {
            if !ancestor.is_complete() {
                return Err(StoreError::InvalidKey(format!(
                    "ancestor key {} is incomplete",
                    ancestor
                )));
            }
        }
        Ok(())
    }

    /// True if `entity` satisfies kind, filter, ancestor, and cursor.
    pub fn matches(&self, entity: &Entity) -> bool {
        if entity.key.kind != self.kind {
            return false;
        }
        if let Some((field, value)) = &self.filter {
            if entity.get(field) != Some(value) {
                return false;
            }
        }
        if let Some(ancestor) = &self.ancestor {
            if !entity.key.has_ancestor(ancestor) {
                return false;
            }
        }
        if let Some(cursor) = &self.start_after {
            if entity.key <= *cursor {
                return false;
            }
        }
        true
    }
}

/// Storage statistics for one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindStat {
    pub kind: String,
    pub count: u64,
    pub bytes: u64,
    pub timestamp: DateTime<Utc>,
}

/// Datastore errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such entity: {key}")]
    NoSuchEntity { key: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    #[error("injected failure: {0}")]
    Injected(String),
}

impl StoreError {
    /// A lookup miss. The probe treats this as "not yet visible".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NoSuchEntity { .. })
    }
}

impl From<StoreError> for cp_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidQuery(msg) => cp_common::Error::InvalidQuery(msg),
            other => cp_common::Error::Storage(other.to_string()),
        }
    }
}

/// The storage operations the probe and inspection commands rely on.
pub trait Datastore {
    /// Upsert `entity`. Incomplete keys get an id; returns the stored key.
    fn put(&self, entity: Entity) -> Result<Key, StoreError>;

    /// Fetch by key. A miss is [`StoreError::NoSuchEntity`].
    fn get(&self, key: &Key) -> Result<Entity, StoreError>;

    /// Run a validated query.
    fn run_query(&self, query: &Query) -> Result<Vec<Entity>, StoreError>;

    /// Number of entities the query would return.
    fn count(&self, query: &Query) -> Result<u64, StoreError> {
        let mut keys = query.clone();
        keys.projection.clear();
        keys.keys_only = true;
        Ok(self.run_query(&keys)?.len() as u64)
    }

    /// Statistics for `kind`; `None` if the store has none.
    fn kind_stat(&self, kind: &str) -> Result<Option<KindStat>, StoreError>;

    /// Deterministic key for a named entity. No storage round-trip.
    fn key_of(&self, kind: &str, name: &str, parent: Option<&Key>) -> Key {
        Key::named(kind, name, parent)
    }
}
