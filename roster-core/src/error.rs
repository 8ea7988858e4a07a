//! Error types for roster core operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single broken validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Violation {
    /// Field path the rule applies to (`name`, `members[2].age`, ...)
    pub field: String,
    /// Human-readable description of the broken rule
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every rule a value broke, in the order the rules were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(transparent)]
#[error("validation failed with {} violation(s)", .violations.len())]
pub struct Violations {
    violations: Vec<Violation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a broken rule.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(field, message));
    }

    /// Merge violations of a nested value, prefixing their field paths.
    pub fn extend_nested(&mut self, prefix: &str, nested: Violations) {
        for v in nested.violations {
            self.violations
                .push(Violation::new(format!("{}.{}", prefix, v.field), v.message));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    /// `Ok(())` when nothing was recorded, otherwise the full set.
    pub fn into_result(self) -> Result<(), Violations> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Violation> for Violations {
    fn from(v: Violation) -> Self {
        Self {
            violations: vec![v],
        }
    }
}

/// Patch document failures. Each variant names the offending operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("operation {index} ({op} {path}): path does not address a field of the target")]
    UnknownPath {
        index: usize,
        op: String,
        path: String,
    },

    #[error("operation {index} ({op} {path}): operation requires a value")]
    MissingValue {
        index: usize,
        op: String,
        path: String,
    },

    #[error("operation {index} ({op} {path}): operation requires a 'from' path")]
    MissingFrom {
        index: usize,
        op: String,
        path: String,
    },

    #[error("operation {index} ({op} {path}): {reason}")]
    InvalidValue {
        index: usize,
        op: String,
        path: String,
        reason: String,
    },

    #[error("operation {index} (test {path}): current value does not match")]
    TestFailed { index: usize, path: String },

    #[error("target cannot be projected for patching: {reason}")]
    Projection { reason: String },
}

impl PatchError {
    /// Index of the failing operation, if the failure belongs to one.
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            PatchError::UnknownPath { index, .. }
            | PatchError::MissingValue { index, .. }
            | PatchError::MissingFrom { index, .. }
            | PatchError::InvalidValue { index, .. }
            | PatchError::TestFailed { index, .. } => Some(*index),
            PatchError::Projection { .. } => None,
        }
    }
}

/// Result of applying a patch document and re-validating the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchOutcomeError {
    #[error("patch could not be applied: {0}")]
    Patch(#[from] PatchError),

    #[error("patched value is invalid: {0}")]
    Invalid(#[from] Violations),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violations_collect_all() {
        let mut v = Violations::new();
        v.push("name", "is required");
        v.push("age", "must be between 0 and 150");
        assert_eq!(v.len(), 2);
        let err = v.into_result().expect_err("two violations");
        assert_eq!(err.to_string(), "validation failed with 2 violation(s)");
    }

    #[test]
    fn test_nested_prefix() {
        let mut inner = Violations::new();
        inner.push("age", "must be between 0 and 150");
        let mut outer = Violations::new();
        outer.extend_nested("members[1]", inner);
        let fields: Vec<_> = outer.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["members[1].age"]);
    }

    #[test]
    fn test_violations_serialize_as_list() {
        let v = Violations::from(Violation::new("name", "is required"));
        let json = serde_json::to_value(&v).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!([{ "field": "name", "message": "is required" }])
        );
    }

    #[test]
    fn test_patch_error_names_operation() {
        let err = PatchError::UnknownPath {
            index: 2,
            op: "replace".to_string(),
            path: "/salary".to_string(),
        };
        assert_eq!(err.operation_index(), Some(2));
        assert!(err.to_string().contains("replace /salary"));
    }
}
