//! Declarative field validation.
//!
//! Rules run against the serialized document, before any store is involved,
//! so both backends accept and reject exactly the same input.

use crate::document::{Document, ID_FIELD};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A single constraint on a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    /// Present, non-null, and not a blank string
    Required,
    /// String with at least this many characters
    MinLength(usize),
    /// Integer no smaller than this
    Min(i64),
}

/// A rule bound to a field, with the message reported on violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldRule {
    /// Field name
    pub field: &'static str,
    /// Constraint
    pub rule: Rule,
    /// Human-readable message
    pub message: &'static str,
}

impl FieldRule {
    /// Bind `rule` to `field`.
    #[must_use]
    pub const fn new(field: &'static str, rule: Rule, message: &'static str) -> Self {
        Self {
            field,
            rule,
            message,
        }
    }

    fn check(&self, value: Option<&Value>) -> bool {
        match (self.rule, value) {
            (Rule::Required, None | Some(Value::Null)) => false,
            (Rule::Required, Some(Value::String(s))) => !s.trim().is_empty(),
            (Rule::Required, Some(_)) => true,
            // Absent values are left to `Required`
            (_, None | Some(Value::Null)) => true,
            (Rule::MinLength(min), Some(Value::String(s))) => s.chars().count() >= min,
            (Rule::Min(min), Some(v)) => v.as_i64().is_some_and(|n| n >= min),
            (Rule::MinLength(_), Some(_)) => false,
        }
    }
}

/// One offending field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every violation found in one document.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("Validation failed: {}", FieldList(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

struct FieldList<'a>(&'a [FieldError]);

impl fmt::Display for FieldList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", error.field, error.message)?;
        }
        Ok(())
    }
}

impl ValidationErrors {
    /// The offending fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }
}

/// Which rules apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Creating a record: every rule applies.
    Full,
    /// Patching a record: only rules for fields present in the patch.
    Partial,
}

/// Check a document against rules, collecting every violation.
///
/// In [`Mode::Partial`] the identity field may not appear in the document.
#[must_use]
pub fn check(rules: &[FieldRule], document: &Document, mode: Mode) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if mode == Mode::Partial && document.contains_key(ID_FIELD) {
        errors.push(FieldError::new(ID_FIELD, "Identity cannot be changed"));
    }

    for rule in rules {
        let value = document.get(rule.field);
        if mode == Mode::Partial && value.is_none() {
            continue;
        }
        let already_reported = errors.iter().any(|e| e.field == rule.field);
        if !already_reported && !rule.check(value) {
            errors.push(FieldError::new(rule.field, rule.message));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RULES: &[FieldRule] = &[
        FieldRule::new("name", Rule::Required, "Name is required"),
        FieldRule::new("password", Rule::Required, "Password is required"),
        FieldRule::new("password", Rule::MinLength(6), "Password must be at least 6 characters"),
        FieldRule::new("capacity", Rule::Min(1), "Capacity must be at least 1"),
    ];

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn full_mode_reports_every_missing_field() {
        let errors = check(RULES, &doc(json!({ "capacity": 10 })), Mode::Full);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "password"]);
    }

    #[test]
    fn blank_strings_are_missing() {
        let errors = check(
            RULES,
            &doc(json!({ "name": "   ", "password": "secret1", "capacity": 1 })),
            Mode::Full,
        );
        assert_eq!(errors, vec![FieldError::new("name", "Name is required")]);
    }

    #[test]
    fn one_error_per_field() {
        let errors = check(
            RULES,
            &doc(json!({ "name": "a", "password": "abc", "capacity": 0 })),
            Mode::Full,
        );
        assert_eq!(
            errors,
            vec![
                FieldError::new("password", "Password must be at least 6 characters"),
                FieldError::new("capacity", "Capacity must be at least 1"),
            ]
        );
    }

    #[test]
    fn partial_mode_skips_absent_fields() {
        let errors = check(RULES, &doc(json!({ "capacity": 5 })), Mode::Partial);
        assert!(errors.is_empty());
    }

    #[test]
    fn partial_mode_rejects_identity_changes() {
        let errors = check(RULES, &doc(json!({ "_id": "x" })), Mode::Partial);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, ID_FIELD);
    }

    #[test]
    fn display_lists_fields() {
        let error = ValidationErrors(vec![FieldError::new("email", "Email is required")]);
        assert_eq!(
            error.to_string(),
            "Validation failed: email (Email is required)"
        );
    }
}
