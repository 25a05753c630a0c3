//! Record instances: attribute storage, dirty tracking, errors and the
//! association cache.
//!
//! A record starts [`New`](RecordState::New), becomes
//! [`Persisted`](RecordState::Persisted) after a successful save (or when
//! hydrated from a query row) and [`Detached`](RecordState::Detached) after
//! a successful destroy. Only persisted records track changes; the change
//! set is diffed against the snapshot taken at the last save or load, so
//! writing a field back to its stored value leaves it clean.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{AssociationKind, RecordType};
use crate::value::{Row, Value};

static NULL: Value = Value::Null;

/// Persistence state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Built in memory, never saved.
    New,
    /// Mirrors a stored row.
    Persisted,
    /// Was persisted, then destroyed. Still readable, no longer stored.
    Detached,
}

/// One pending attribute change.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub old: Value,
    pub new: Value,
}

/// A resolved association held in a record's cache.
#[derive(Debug, Clone)]
pub enum Loaded {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Loaded {
    /// The single record for `belongs_to`/`has_one` results.
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Loaded::One(record) => record.as_deref(),
            Loaded::Many(_) => None,
        }
    }

    /// The collection for `has_many` results; empty for singular results.
    pub fn as_many(&self) -> &[Record] {
        match self {
            Loaded::Many(records) => records,
            Loaded::One(_) => &[],
        }
    }
}

/// An instance of a [`RecordType`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use recordkit_core::{row, Record, RecordState, RecordType, Value};
///
/// let users = Arc::new(RecordType::new("User"));
/// let mut alice = Record::new(&users, row! { "name" => "Alice" });
/// alice.set("age", 28);
///
/// assert_eq!(alice.state(), RecordState::New);
/// assert_eq!(alice.get("age"), &Value::Integer(28));
/// assert!(alice.changes().is_empty()); // only persisted records track changes
/// ```
#[derive(Clone)]
pub struct Record {
    record_type: Arc<RecordType>,
    attributes: Row,
    original: Row,
    changes: BTreeMap<String, Change>,
    errors: BTreeMap<String, Vec<String>>,
    state: RecordState,
    associations: BTreeMap<String, Loaded>,
}

impl Record {
    /// Builds a transient record from the given attributes.
    pub fn new(record_type: &Arc<RecordType>, attributes: Row) -> Self {
        Self {
            record_type: Arc::clone(record_type),
            attributes,
            original: Row::new(),
            changes: BTreeMap::new(),
            errors: BTreeMap::new(),
            state: RecordState::New,
            associations: BTreeMap::new(),
        }
    }

    /// Builds a persisted record from a result row.
    pub fn hydrate(record_type: &Arc<RecordType>, row: Row) -> Self {
        let mut record = Self::new(record_type, row);
        record.mark_persisted();
        record
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn type_name(&self) -> &str {
        &self.record_type.name
    }

    /// Reads an attribute; missing attributes read as `Null`.
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Writes an attribute.
    ///
    /// On a persisted record the write is diffed against the stored
    /// snapshot. Writing a `belongs_to` foreign key drops that
    /// association from the cache.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();

        if self.state == RecordState::Persisted {
            let stored = self.original.get(name).cloned().unwrap_or_default();
            if stored == value {
                self.changes.remove(name);
            } else {
                self.changes.insert(
                    name.to_string(),
                    Change {
                        old: stored,
                        new: value.clone(),
                    },
                );
            }
        }

        let stale: Vec<String> = self
            .record_type
            .associations
            .values()
            .filter(|def| def.kind == AssociationKind::BelongsTo && def.foreign_key == name)
            .map(|def| def.name.clone())
            .collect();
        for association in stale {
            self.associations.remove(&association);
        }

        self.attributes.insert(name.to_string(), value);
    }

    /// Writes every attribute in `attributes` through [`set`](Self::set).
    pub fn assign(&mut self, attributes: Row) {
        for (name, value) in attributes {
            self.set(&name, value);
        }
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Primary-key value, `Null` while unassigned.
    pub fn id(&self) -> &Value {
        self.get(&self.record_type.primary_key)
    }

    pub fn changes(&self) -> &BTreeMap<String, Change> {
        &self.changes
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.changes.contains_key(name)
    }

    /// Value stored at the last save or load.
    pub fn attribute_was(&self, name: &str) -> &Value {
        match self.state {
            RecordState::Persisted => self.original.get(name).unwrap_or(&NULL),
            _ => self.get(name),
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_persisted(&self) -> bool {
        self.state == RecordState::Persisted
    }

    pub fn is_new(&self) -> bool {
        self.state == RecordState::New
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// Messages recorded for one field.
    pub fn errors_on(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Cached association, if it was loaded or eager-loaded.
    pub fn association(&self, name: &str) -> Option<&Loaded> {
        self.associations.get(name)
    }

    pub fn clear_association_cache(&mut self) {
        self.associations.clear();
    }

    /// Attributes as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), json_value(value)))
            .collect();
        serde_json::Value::Object(map)
    }

    pub(crate) fn cache_association(&mut self, name: &str, loaded: Loaded) {
        self.associations.insert(name.to_string(), loaded);
    }

    pub(crate) fn invalidate_association(&mut self, name: &str) {
        self.associations.remove(name);
    }

    /// Writes without dirty tracking (engine-assigned ids, reloads).
    pub(crate) fn write_raw(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    pub(crate) fn replace_attributes(&mut self, attributes: Row) {
        self.attributes = attributes;
    }

    /// Primary-key value as of the last save or load.
    pub(crate) fn stored_id(&self) -> &Value {
        self.original
            .get(&self.record_type.primary_key)
            .unwrap_or_else(|| self.id())
    }

    /// Takes a new baseline: clears the change set and snapshots attributes.
    pub(crate) fn mark_persisted(&mut self) {
        self.state = RecordState::Persisted;
        self.changes.clear();
        self.original = self.attributes.clone();
    }

    pub(crate) fn mark_detached(&mut self) {
        self.state = RecordState::Detached;
        self.changes.clear();
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.record_type.name)
            .field("state", &self.state)
            .field("attributes", &self.attributes)
            .field("changes", &self.changes)
            .field("errors", &self.errors)
            .field("associations", &self.associations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(r) => serde_json::Value::from(*r),
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::Value::from(b.clone()),
    }
}
