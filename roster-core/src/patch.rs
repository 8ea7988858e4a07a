//! Patch Documents
//!
//! JSON Patch style documents applied to an update-shape projection. Paths
//! address top-level fields of the projection (`/age`). Every operation is a
//! value assignment, so applying the same document to the same starting value
//! always produces the same result.
//!
//! Application is all-or-nothing: the input value is never touched, and the
//! first failing operation aborts the whole document.

use crate::error::{PatchError, PatchOutcomeError};
use crate::validation::Validate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Operation kinds understood by the patch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Assign a value to the field
    Add,
    /// Reset the field to its default value
    Remove,
    /// Assign a value to the field
    Replace,
    /// Assign the value of `from` to the field
    Copy,
    /// Assign the value of `from` to the field and reset `from`
    Move,
    /// Fail the document unless the field equals the value
    Test,
}

impl PatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
            PatchOp::Copy => "copy",
            PatchOp::Move => "move",
            PatchOp::Test => "test",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps an explicit `null` distinct from an absent `value` member.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One operation of a patch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl PatchOperation {
    /// A `replace` operation, the common case.
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    /// A `remove` operation.
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
            from: None,
        }
    }

    fn unknown_path(&self, index: usize, path: &str) -> PatchError {
        PatchError::UnknownPath {
            index,
            op: self.op.to_string(),
            path: path.to_string(),
        }
    }

    fn value_or_err(&self, index: usize) -> Result<&Value, PatchError> {
        self.value.as_ref().ok_or_else(|| PatchError::MissingValue {
            index,
            op: self.op.to_string(),
            path: self.path.clone(),
        })
    }

    fn from_or_err(&self, index: usize) -> Result<&str, PatchError> {
        self.from.as_deref().ok_or_else(|| PatchError::MissingFrom {
            index,
            op: self.op.to_string(),
            path: self.path.clone(),
        })
    }
}

/// Ordered sequence of patch operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct PatchDocument {
    pub operations: Vec<PatchOperation>,
}

impl From<Vec<PatchOperation>> for PatchDocument {
    fn from(operations: Vec<PatchOperation>) -> Self {
        Self { operations }
    }
}

/// Resolve a pointer to a top-level field name of `doc`.
fn field_of(doc: &Map<String, Value>, pointer: &str) -> Option<String> {
    let segment = pointer.strip_prefix('/')?;
    if segment.contains('/') {
        return None;
    }
    let field = segment.replace("~1", "/").replace("~0", "~");
    doc.contains_key(&field).then_some(field)
}

fn as_object(value: Value) -> Result<Map<String, Value>, PatchError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PatchError::Projection {
            reason: format!("expected an object, found {}", other),
        }),
    }
}

impl PatchDocument {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Apply every operation to a copy of `target`.
    ///
    /// Returns the patched copy; `target` itself is never modified.
    pub fn apply_to<T>(&self, target: &T) -> Result<T, PatchError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let projection = |value: &T| {
            serde_json::to_value(value).map_err(|e| PatchError::Projection {
                reason: e.to_string(),
            })
        };
        let mut doc = as_object(projection(target)?)?;
        let defaults = as_object(projection(&T::default())?)?;

        for (index, operation) in self.operations.iter().enumerate() {
            let field = field_of(&doc, &operation.path)
                .ok_or_else(|| operation.unknown_path(index, &operation.path))?;

            match operation.op {
                PatchOp::Add | PatchOp::Replace => {
                    let value = operation.value_or_err(index)?;
                    doc.insert(field, value.clone());
                }
                PatchOp::Remove => {
                    let reset = defaults.get(&field).cloned().unwrap_or(Value::Null);
                    doc.insert(field, reset);
                }
                PatchOp::Copy | PatchOp::Move => {
                    let from = operation.from_or_err(index)?;
                    let source =
                        field_of(&doc, from).ok_or_else(|| operation.unknown_path(index, from))?;
                    let value = doc.get(&source).cloned().unwrap_or(Value::Null);
                    if operation.op == PatchOp::Move && source != field {
                        let reset = defaults.get(&source).cloned().unwrap_or(Value::Null);
                        doc.insert(source, reset);
                    }
                    doc.insert(field, value);
                }
                PatchOp::Test => {
                    let expected = operation.value_or_err(index)?;
                    if doc.get(&field) != Some(expected) {
                        return Err(PatchError::TestFailed {
                            index,
                            path: operation.path.clone(),
                        });
                    }
                    continue;
                }
            }

            // Type errors belong to the operation that introduced them.
            serde_json::from_value::<T>(Value::Object(doc.clone())).map_err(|e| {
                PatchError::InvalidValue {
                    index,
                    op: operation.op.to_string(),
                    path: operation.path.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        serde_json::from_value(Value::Object(doc)).map_err(|e| PatchError::Projection {
            reason: e.to_string(),
        })
    }

    /// Apply the document and re-run schema validation on the result.
    pub fn apply_validated<T>(&self, target: &T) -> Result<T, PatchOutcomeError>
    where
        T: Serialize + DeserializeOwned + Default + Validate,
    {
        let patched = self.apply_to(target)?;
        patched.validate()?;
        Ok(patched)
    }
}
