//! Naming conventions used to infer association targets and foreign keys.
//!
//! The conventions are deliberately small: every inferred name can be
//! overridden through [`AssociationOptions`](crate::AssociationOptions).

/// Strips a plural suffix: `"posts"` → `"post"`, `"categories"` → `"category"`.
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Upper-cases the first character: `"author"` → `"Author"`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Target type for a collection association (`has_many "posts"` → `"Post"`).
pub fn collection_target(association: &str) -> String {
    capitalize(&singularize(association))
}

/// Target type for a singular association (`belongs_to "author"` → `"Author"`).
pub fn singular_target(association: &str) -> String {
    capitalize(association)
}

/// Foreign key on the owner's table for `belongs_to "x"`: `"x_id"`.
pub fn belongs_to_foreign_key(association: &str) -> String {
    format!("{association}_id")
}

/// Foreign key on the target's table for `has_many`/`has_one`:
/// `"<owner_type_lowercased>_id"`.
pub fn owner_foreign_key(owner_type: &str) -> String {
    format!("{}_id", owner_type.to_lowercase())
}
