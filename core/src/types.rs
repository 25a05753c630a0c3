//! Record type descriptors.
//!
//! A [`RecordType`] describes one modeled entity: its table, primary key,
//! declared column schema, validation rules, associations and lifecycle
//! hooks. Descriptors are built once at model-definition time, registered
//! in a [`ModelRegistry`](crate::ModelRegistry) and treated as read-only
//! afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::inflect;
use crate::record::Record;
use crate::validate::ValidationRules;
use crate::value::Value;

/// Column default: a literal value or a raw SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Rendered as a quoted literal (`DEFAULT 'draft'`).
    Literal(Value),
    /// Rendered verbatim (`DEFAULT CURRENT_TIMESTAMP`).
    Expr(String),
}

impl DefaultValue {
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Literal(value) => value.to_sql_literal(),
            DefaultValue::Expr(expr) => expr.clone(),
        }
    }
}

/// Declared schema of one column.
///
/// `sql_type` keeps the declared spelling (`"integer"`, `"string"`,
/// `"NUMERIC(10,2)"`); DDL generation normalizes it.
///
/// # Examples
///
/// ```
/// use recordkit_core::FieldDef;
///
/// let id = FieldDef::integer("id").primary_key().auto_increment();
/// assert!(id.primary_key && id.auto_increment);
///
/// let email = FieldDef::text("email").not_null().unique();
/// assert_eq!(email.sql_type, "text");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub sql_type: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
}

impl FieldDef {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            primary_key: false,
            auto_increment: false,
            not_null: false,
            unique: false,
            default: None,
        }
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, "integer")
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, "text")
    }

    pub fn real(name: &str) -> Self {
        Self::new(name, "real")
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, "boolean")
    }

    pub fn blob(name: &str) -> Self {
        Self::new(name, "blob")
    }

    pub fn timestamp(name: &str) -> Self {
        Self::new(name, "timestamp")
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_expr(mut self, expr: &str) -> Self {
        self.default = Some(DefaultValue::Expr(expr.to_string()));
        self
    }
}

/// Kind of relationship between two record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// Owner row holds the foreign key (`posts.user_id` → `users.id`).
    BelongsTo,
    /// Target rows hold the foreign key; loads a collection.
    HasMany,
    /// Target row holds the foreign key; loads a single record.
    HasOne,
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationKind::BelongsTo => write!(f, "belongs_to"),
            AssociationKind::HasMany => write!(f, "has_many"),
            AssociationKind::HasOne => write!(f, "has_one"),
        }
    }
}

/// Explicit overrides for convention-inferred association metadata.
///
/// # Examples
///
/// ```
/// use recordkit_core::AssociationOptions;
///
/// let opts = AssociationOptions::new().target("User").foreign_key("writer_id");
/// assert_eq!(opts.target.as_deref(), Some("User"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationOptions {
    pub target: Option<String>,
    pub foreign_key: Option<String>,
    pub local_key: Option<String>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, type_name: &str) -> Self {
        self.target = Some(type_name.to_string());
        self
    }

    pub fn foreign_key(mut self, column: &str) -> Self {
        self.foreign_key = Some(column.to_string());
        self
    }

    pub fn local_key(mut self, column: &str) -> Self {
        self.local_key = Some(column.to_string());
        self
    }
}

/// Resolved association metadata.
///
/// For `belongs_to`, `foreign_key` lives on the owner's table and
/// `local_key` names the owner's primary key (unused for lookup; the
/// target is found by its own primary key). For `has_many`/`has_one`,
/// `foreign_key` lives on the target's table and is matched against the
/// owner's `local_key` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDef {
    pub kind: AssociationKind,
    pub name: String,
    pub target: String,
    pub foreign_key: String,
    pub local_key: String,
}

impl AssociationDef {
    /// Applies naming conventions, then explicit overrides.
    ///
    /// # Examples
    ///
    /// ```
    /// use recordkit_core::{AssociationDef, AssociationKind, AssociationOptions};
    ///
    /// let posts = AssociationDef::infer("User", "id", AssociationKind::HasMany, "posts", AssociationOptions::new());
    /// assert_eq!(posts.target, "Post");
    /// assert_eq!(posts.foreign_key, "user_id");
    ///
    /// let author = AssociationDef::infer("Post", "id", AssociationKind::BelongsTo, "author",
    ///     AssociationOptions::new().target("User"));
    /// assert_eq!(author.target, "User");
    /// assert_eq!(author.foreign_key, "author_id");
    /// ```
    pub fn infer(
        owner_type: &str,
        owner_primary_key: &str,
        kind: AssociationKind,
        name: &str,
        options: AssociationOptions,
    ) -> Self {
        let target = options.target.unwrap_or_else(|| match kind {
            AssociationKind::HasMany => inflect::collection_target(name),
            AssociationKind::BelongsTo | AssociationKind::HasOne => inflect::singular_target(name),
        });
        let foreign_key = options.foreign_key.unwrap_or_else(|| match kind {
            AssociationKind::BelongsTo => inflect::belongs_to_foreign_key(name),
            AssociationKind::HasMany | AssociationKind::HasOne => {
                inflect::owner_foreign_key(owner_type)
            }
        });
        let local_key = options
            .local_key
            .unwrap_or_else(|| owner_primary_key.to_string());

        Self {
            kind,
            name: name.to_string(),
            target,
            foreign_key,
            local_key,
        }
    }
}

/// Lifecycle points at which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lifecycle {
    BeforeSave,
    BeforeCreate,
    BeforeUpdate,
    AfterSave,
    AfterCreate,
    AfterUpdate,
    BeforeDestroy,
    AfterDestroy,
}

/// Lifecycle hook or custom validator.
///
/// Validators report problems through [`Record::add_error`].
pub type Hook = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// Descriptor of one modeled entity.
///
/// # Examples
///
/// ```
/// use recordkit_core::{AssociationOptions, FieldDef, RecordType, ValidationRules};
///
/// let user = RecordType::new("User")
///     .table("users")
///     .field(FieldDef::integer("id").primary_key().auto_increment())
///     .field(FieldDef::text("email").not_null())
///     .validates("email", ValidationRules::new().required().email())
///     .has_many("posts", AssociationOptions::new());
///
/// assert_eq!(user.table_name, "users");
/// assert_eq!(user.primary_key, "id");
/// assert_eq!(user.association("posts").unwrap().foreign_key, "user_id");
/// ```
#[derive(Clone)]
pub struct RecordType {
    pub name: String,
    pub table_name: String,
    pub primary_key: String,
    pub fields: Vec<FieldDef>,
    pub validations: BTreeMap<String, ValidationRules>,
    pub associations: BTreeMap<String, AssociationDef>,
    /// Maintain `created_at`/`updated_at` on save.
    pub timestamps: bool,
    hooks: BTreeMap<Lifecycle, Vec<Hook>>,
    validators: Vec<Hook>,
}

impl RecordType {
    /// Creates a descriptor with table `<name lowercased>s` and primary key `id`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: format!("{}s", name.to_lowercase()),
            primary_key: "id".to_string(),
            fields: Vec::new(),
            validations: BTreeMap::new(),
            associations: BTreeMap::new(),
            timestamps: false,
            hooks: BTreeMap::new(),
            validators: Vec::new(),
        }
    }

    pub fn table(mut self, table_name: &str) -> Self {
        self.table_name = table_name.to_string();
        self
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    /// Declares a column. Re-declaring a column replaces it in place.
    pub fn field(mut self, field: FieldDef) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn validates(mut self, field: &str, rules: ValidationRules) -> Self {
        self.validations.insert(field.to_string(), rules);
        self
    }

    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn belongs_to(mut self, name: &str, options: AssociationOptions) -> Self {
        self.register_association(AssociationKind::BelongsTo, name, options);
        self
    }

    pub fn has_many(mut self, name: &str, options: AssociationOptions) -> Self {
        self.register_association(AssociationKind::HasMany, name, options);
        self
    }

    pub fn has_one(mut self, name: &str, options: AssociationOptions) -> Self {
        self.register_association(AssociationKind::HasOne, name, options);
        self
    }

    /// Adds a lifecycle hook. Several hooks on one point run in order.
    pub fn on(mut self, point: Lifecycle, hook: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.hooks.entry(point).or_default().push(Arc::new(hook));
        self
    }

    /// Adds a custom validator, run after the built-in rules.
    pub fn validate_with(mut self, validator: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Stores association metadata, overwriting any previous registration
    /// under the same name.
    pub fn register_association(
        &mut self,
        kind: AssociationKind,
        name: &str,
        options: AssociationOptions,
    ) -> &AssociationDef {
        let def = AssociationDef::infer(&self.name, &self.primary_key, kind, name, options);
        self.associations.insert(name.to_string(), def);
        &self.associations[name]
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDef> {
        self.associations.get(name)
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn hooks(&self, point: Lifecycle) -> &[Hook] {
        self.hooks.get(&point).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn validators(&self) -> &[Hook] {
        &self.validators
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .field("validations", &self.validations)
            .field("associations", &self.associations)
            .field("timestamps", &self.timestamps)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.len())
            .finish()
    }
}
