//! Association loading: lazy loaders, the `has_many` proxy and batched
//! eager loading.
//!
//! Eager loading issues exactly one query per association name regardless
//! of how many owners are passed in, and none at all when every owner key
//! is `NULL`. Loaded results are cached on each owner and read back with
//! [`Record::association`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::query::QueryBuilder;
use crate::record::{Loaded, Record};
use crate::repo::{Model, Repo};
use crate::types::{AssociationDef, AssociationKind, RecordType};
use crate::value::{Row, Value, ValueKey};

/// Lazy collection for a `has_many` association.
///
/// Created by [`Repo::has_many`] and borrows its owner. The materialized
/// collection lives in the owner's association cache, so a proxy over an
/// eager-loaded owner starts out loaded and a lazy load is visible through
/// [`Record::association`] afterwards.
#[derive(Debug)]
pub struct HasMany<'r, 'o> {
    target: Model<'r>,
    name: String,
    foreign_key: String,
    local_key: String,
    owner: &'o mut Record,
}

impl<'r> HasMany<'r, '_> {
    fn owner_key(&self) -> Value {
        self.owner.get(&self.local_key).clone()
    }

    /// Unmaterialized query over the associated rows.
    pub fn scope(&self) -> QueryBuilder<'r> {
        self.target
            .query()
            .where_eq(&self.foreign_key, self.owner_key())
    }

    /// Narrower query over the associated rows.
    pub fn where_eq(&self, column: &str, value: impl Into<Value>) -> QueryBuilder<'r> {
        self.scope().where_eq(column, value)
    }

    pub fn where_raw(&self, fragment: &str, params: impl IntoIterator<Item = Value>) -> QueryBuilder<'r> {
        self.scope().where_raw(fragment, params)
    }

    /// Associated records; queries once, then serves the owner's cache.
    pub fn all(&mut self) -> Result<&[Record]> {
        if !self.is_loaded() {
            let records = if self.owner_key().is_null() {
                Vec::new()
            } else {
                self.scope().all()?
            };
            self.owner.cache_association(&self.name, Loaded::Many(records));
        }
        Ok(self
            .owner
            .association(&self.name)
            .map(Loaded::as_many)
            .unwrap_or_default())
    }

    /// Materialized records, cloned out of the owner's cache.
    pub fn into_records(mut self) -> Result<Vec<Record>> {
        Ok(self.all()?.to_vec())
    }

    pub fn count(&self) -> Result<i64> {
        match self.owner.association(&self.name) {
            Some(Loaded::Many(records)) => Ok(records.len() as i64),
            _ if self.owner_key().is_null() => Ok(0),
            _ => self.scope().count(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.owner.association(&self.name), Some(Loaded::Many(_)))
    }

    /// Drops the materialized collection from the owner's cache.
    pub fn reset(&mut self) {
        self.owner.invalidate_association(&self.name);
    }

    /// Creates an associated record with the foreign key filled in, then
    /// drops the owner's cached collection.
    pub fn create(&mut self, mut attributes: Row) -> Result<Record> {
        let owner_key = self.owner_key();
        if owner_key.is_null() {
            return Err(Error::MissingPrimaryKey(self.owner.type_name().to_string()));
        }
        attributes.insert(self.foreign_key.clone(), owner_key);
        let record = self.target.create(attributes)?;
        self.reset();
        Ok(record)
    }
}

impl<'r> Repo<'r> {
    fn resolve(
        &self,
        owner: &Record,
        name: &str,
        expected: AssociationKind,
    ) -> Result<(Model<'r>, AssociationDef)> {
        let (target, def) = self.registry().association(owner.type_name(), name)?;
        if def.kind != expected {
            return Err(Error::UnknownAssociation {
                model: owner.type_name().to_string(),
                name: format!("{name} ({expected})"),
            });
        }
        Ok((self.model(&target.name)?, def.clone()))
    }

    /// Loads a `belongs_to` association, caching the result on `record`.
    ///
    /// A `NULL` foreign key resolves to `None` without querying.
    pub fn belongs_to(&self, record: &mut Record, name: &str) -> Result<Option<Record>> {
        if let Some(Loaded::One(cached)) = record.association(name) {
            return Ok(cached.as_deref().cloned());
        }
        let (target, def) = self.resolve(record, name, AssociationKind::BelongsTo)?;
        let key = record.get(&def.foreign_key).clone();
        let found = if key.is_null() {
            None
        } else {
            target.find(key)?
        };
        record.cache_association(name, Loaded::One(found.clone().map(Box::new)));
        Ok(found)
    }

    /// Loads a `has_one` association, caching the result on `record`.
    pub fn has_one(&self, record: &mut Record, name: &str) -> Result<Option<Record>> {
        if let Some(Loaded::One(cached)) = record.association(name) {
            return Ok(cached.as_deref().cloned());
        }
        let (target, def) = self.resolve(record, name, AssociationKind::HasOne)?;
        let key = record.get(&def.local_key).clone();
        let found = if key.is_null() {
            None
        } else {
            target.query().where_eq(&def.foreign_key, key).first()?
        };
        record.cache_association(name, Loaded::One(found.clone().map(Box::new)));
        Ok(found)
    }

    /// Returns the lazy collection for a `has_many` association.
    pub fn has_many<'o>(&self, record: &'o mut Record, name: &str) -> Result<HasMany<'r, 'o>> {
        let (target, def) = self.resolve(record, name, AssociationKind::HasMany)?;
        Ok(HasMany {
            target,
            name: name.to_string(),
            foreign_key: def.foreign_key,
            local_key: def.local_key,
            owner: record,
        })
    }

    /// Batch-loads each named association for every record in `records`.
    ///
    /// All records must share one record type. Owners without a match get
    /// an empty collection (`has_many`) or `None` (`belongs_to`,
    /// `has_one`) in their cache.
    pub fn eager_load<S: AsRef<str>>(&self, records: &mut [Record], names: &[S]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let owner = first.type_name().to_string();

        for name in names {
            let name = name.as_ref();
            let (target, def) = self.registry().association(&owner, name)?;
            match def.kind {
                AssociationKind::BelongsTo => {
                    self.eager_belongs_to(records, name, &def.foreign_key, target)?
                }
                AssociationKind::HasMany | AssociationKind::HasOne => {
                    self.eager_owned(records, def, target)?
                }
            }
        }
        Ok(())
    }

    fn eager_belongs_to(
        &self,
        records: &mut [Record],
        name: &str,
        foreign_key: &str,
        target: &Arc<RecordType>,
    ) -> Result<()> {
        let keys = distinct_keys(records, foreign_key);
        let mut by_id: HashMap<ValueKey, Record> = HashMap::new();
        if !keys.is_empty() {
            debug!(association = name, keys = keys.len(), "eager loading belongs_to");
            let found = QueryBuilder::new(*self, Arc::clone(target))
                .where_in(&target.primary_key, keys)
                .all()?;
            for record in found {
                if let Some(key) = record.id().key() {
                    by_id.insert(key, record);
                }
            }
        }

        for record in records.iter_mut() {
            let matched = record
                .get(foreign_key)
                .key()
                .and_then(|key| by_id.get(&key))
                .cloned();
            record.cache_association(name, Loaded::One(matched.map(Box::new)));
        }
        Ok(())
    }

    fn eager_owned(
        &self,
        records: &mut [Record],
        def: &AssociationDef,
        target: &Arc<RecordType>,
    ) -> Result<()> {
        let keys = distinct_keys(records, &def.local_key);
        let mut grouped: HashMap<ValueKey, Vec<Record>> = HashMap::new();
        if !keys.is_empty() {
            debug!(association = %def.name, kind = %def.kind, keys = keys.len(), "eager loading");
            let found = QueryBuilder::new(*self, Arc::clone(target))
                .where_in(&def.foreign_key, keys)
                .all()?;
            for record in found {
                if let Some(key) = record.get(&def.foreign_key).key() {
                    grouped.entry(key).or_default().push(record);
                }
            }
        }

        for record in records.iter_mut() {
            let matches = record
                .get(&def.local_key)
                .key()
                .and_then(|key| grouped.get(&key))
                .cloned()
                .unwrap_or_default();
            let loaded = match def.kind {
                AssociationKind::HasMany => Loaded::Many(matches),
                _ => Loaded::One(matches.into_iter().next().map(Box::new)),
            };
            record.cache_association(&def.name, loaded);
        }
        Ok(())
    }
}

/// Non-null values of `column`, deduplicated in first-seen order.
fn distinct_keys(records: &[Record], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .iter()
        .map(|record| record.get(column))
        .filter(|value| value.key().is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}
