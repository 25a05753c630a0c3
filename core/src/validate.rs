//! Built-in attribute validation rules.
//!
//! Rules are independent: one field may collect several messages. Only
//! `required` looks at missing values; every other rule is skipped for
//! `Null`, so optional fields are validated only when present.
//!
//! The `unique` rule needs a database round trip and is evaluated by
//! [`Repo::valid`](crate::Repo::valid); [`check_field`] covers the rest.
//!
//! # Examples
//!
//! ```
//! use recordkit_core::{check_field, ValidationRules, Value};
//!
//! let rules = ValidationRules::new().required().email();
//! assert!(check_field(&Value::from("alice@example.com"), &rules).is_empty());
//! assert_eq!(check_field(&Value::from("bad"), &rules), vec!["is not a valid email".to_string()]);
//! assert_eq!(check_field(&Value::Null, &rules), vec!["is required".to_string()]);
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::Value;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex must compile")
});

/// Expected storage kind for the `type` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Integer,
    String,
}

/// Named formats for the `format` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Simple `local@domain.tld` shape.
    Email,
}

/// Rule set for one field. Every rule is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: Option<ValueKind>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub format: Option<Format>,
    pub inclusion: Option<Vec<Value>>,
    pub unique: bool,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        self.min = Some(n);
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        self.max = Some(n);
        self
    }

    pub fn email(mut self) -> Self {
        self.format = Some(Format::Email);
        self
    }

    pub fn inclusion<V: Into<Value>>(mut self, allowed: impl IntoIterator<Item = V>) -> Self {
        self.inclusion = Some(allowed.into_iter().map(Into::into).collect());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Evaluates every rule except `unique` and returns the error messages.
pub fn check_field(value: &Value, rules: &ValidationRules) -> Vec<String> {
    let mut errors = Vec::new();

    if value.is_blank() {
        if rules.required {
            errors.push("is required".to_string());
        }
        if value.is_null() {
            return errors;
        }
    }

    match rules.kind {
        Some(ValueKind::Integer) if !matches!(value, Value::Integer(_)) => {
            errors.push("must be an integer".to_string());
        }
        Some(ValueKind::String) if !matches!(value, Value::Text(_)) => {
            errors.push("must be a string".to_string());
        }
        _ => {}
    }

    if let Value::Text(s) = value {
        let len = s.chars().count();
        if let Some(min) = rules.min_length {
            if len < min {
                errors.push(format!("is too short (minimum is {min} characters)"));
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                errors.push(format!("is too long (maximum is {max} characters)"));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.min {
            if n < min {
                errors.push(format!("must be greater than or equal to {min}"));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                errors.push(format!("must be less than or equal to {max}"));
            }
        }
    }

    if let Some(Format::Email) = rules.format {
        let matches = value.as_str().is_some_and(|s| EMAIL_RE.is_match(s));
        if !matches {
            errors.push("is not a valid email".to_string());
        }
    }

    if let Some(allowed) = &rules.inclusion {
        if !allowed.iter().any(|candidate| candidate == value) {
            errors.push("is not included in the list".to_string());
        }
    }

    errors
}

/// Message recorded when the `unique` rule finds a conflicting row.
pub const UNIQUE_MESSAGE: &str = "has already been taken";
