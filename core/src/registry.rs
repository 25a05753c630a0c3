//! Name-to-descriptor registry used to resolve association targets.
//!
//! The registry is an explicit value: build it at startup, pass it to a
//! [`Repo`](crate::Repo), and drop or [`clear`](ModelRegistry::clear) it
//! on teardown.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{AssociationDef, AssociationKind, AssociationOptions, RecordType};

/// Registered record types, keyed by type name.
///
/// # Examples
///
/// ```
/// use recordkit_core::{AssociationOptions, ModelRegistry, RecordType};
///
/// let mut registry = ModelRegistry::new();
/// registry.define(RecordType::new("User").has_many("posts", AssociationOptions::new())).unwrap();
/// registry.define(RecordType::new("Post").belongs_to("user", AssociationOptions::new())).unwrap();
///
/// let (_, def) = registry.association("User", "posts").unwrap();
/// assert_eq!(def.target, "Post");
/// assert!(registry.define(RecordType::new("User")).is_err());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    types: BTreeMap<String, Arc<RecordType>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record type and returns the shared descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateModel`] if the name is already taken.
    pub fn define(&mut self, record_type: RecordType) -> Result<Arc<RecordType>> {
        if self.types.contains_key(&record_type.name) {
            return Err(Error::DuplicateModel(record_type.name));
        }
        let shared = Arc::new(record_type);
        self.types.insert(shared.name.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Looks up a record type by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModel`] if no such type is registered.
    pub fn get(&self, name: &str) -> Result<&Arc<RecordType>> {
        self.types
            .get(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Adds or overwrites an association on a registered type.
    ///
    /// Records created before this call keep the descriptor they were
    /// built with; association loading always reads the registry.
    pub fn register_association(
        &mut self,
        owner: &str,
        kind: AssociationKind,
        name: &str,
        options: AssociationOptions,
    ) -> Result<AssociationDef> {
        let entry = self
            .types
            .get_mut(owner)
            .ok_or_else(|| Error::UnknownModel(owner.to_string()))?;
        let def = Arc::make_mut(entry)
            .register_association(kind, name, options)
            .clone();
        Ok(def)
    }

    /// Resolves an association on `owner` together with its target type.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownAssociation`] for an unregistered name and
    /// [`Error::UnresolvedTarget`] when the target type is not registered.
    pub fn association(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<(&Arc<RecordType>, &AssociationDef)> {
        let owner_type = self.get(owner)?;
        let def = owner_type
            .association(name)
            .ok_or_else(|| Error::UnknownAssociation {
                model: owner.to_string(),
                name: name.to_string(),
            })?;
        let target = self
            .types
            .get(&def.target)
            .ok_or_else(|| Error::UnresolvedTarget {
                model: owner.to_string(),
                name: name.to_string(),
                target: def.target.clone(),
            })?;
        Ok((target, def))
    }

    /// Removes every registered type.
    pub fn clear(&mut self) {
        self.types.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_association_fails_fast() {
        let mut registry = ModelRegistry::new();
        registry.define(RecordType::new("User")).unwrap();
        let err = registry.association("User", "posts").unwrap_err();
        assert!(matches!(err, Error::UnknownAssociation { .. }));
    }

    #[test]
    fn test_unresolved_target_fails_fast() {
        let mut registry = ModelRegistry::new();
        registry
            .define(RecordType::new("User").has_many("posts", AssociationOptions::new()))
            .unwrap();
        let err = registry.association("User", "posts").unwrap_err();
        assert!(matches!(err, Error::UnresolvedTarget { ref target, .. } if target == "Post"));
    }

    #[test]
    fn test_register_association_after_definition() {
        let mut registry = ModelRegistry::new();
        registry.define(RecordType::new("User")).unwrap();
        registry.define(RecordType::new("Profile")).unwrap();

        let def = registry
            .register_association("User", AssociationKind::HasOne, "profile", AssociationOptions::new())
            .unwrap();
        assert_eq!(def.foreign_key, "user_id");
        assert!(registry.association("User", "profile").is_ok());
    }

    #[test]
    fn test_clear() {
        let mut registry = ModelRegistry::new();
        registry.define(RecordType::new("User")).unwrap();
        registry.clear();
        assert!(!registry.contains("User"));
        assert_eq!(registry.names().count(), 0);
    }
}
