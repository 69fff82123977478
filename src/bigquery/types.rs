//! Typed view of BigQuery job and result payloads.
//!
//! Cells arrive as `{"v": ...}` where the value is `null`, a string, an array
//! of cells (REPEATED columns) or an object `{"f": [...]}` (RECORD columns).

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Job State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state reported by the jobs API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        self == JobState::Done
    }
}

/// Error detail attached to a job status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl std::fmt::Display for ErrorProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self.message.as_deref().unwrap_or("Unknown error");
        match &self.reason {
            Some(reason) => write!(f, "[{}] {}", reason, message),
            None => f.write_str(message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// One column of a result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Ordered column list of a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl TableSchema {
    /// Column names in schema order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rows
// ─────────────────────────────────────────────────────────────────────────────

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Primitive(String),
    Repeated(Vec<FieldValue>),
    Record(Vec<FieldValue>),
}

impl FieldValue {
    /// Returns the string payload of a primitive value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Primitive(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Primitive(_) => "primitive",
            FieldValue::Repeated(_) => "repeated",
            FieldValue::Record(_) => "record",
        }
    }

    /// Decodes the content of a `v` slot.
    pub(crate) fn from_json(value: serde_json::Value) -> Result<Self, AppError> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::String(s) => Ok(FieldValue::Primitive(s)),
            Value::Bool(b) => Ok(FieldValue::Primitive(b.to_string())),
            Value::Number(n) => Ok(FieldValue::Primitive(n.to_string())),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(mut cell) => {
                        FieldValue::from_json(cell.remove("v").unwrap_or(Value::Null))
                    }
                    other => FieldValue::from_json(other),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Repeated),
            Value::Object(mut obj) => match obj.remove("f") {
                Some(Value::Array(cells)) => cells
                    .into_iter()
                    .map(decode_cell)
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::Record),
                _ => Err(AppError::Internal(
                    "Record value without an 'f' array".to_string(),
                )),
            },
        }
    }
}

/// Decodes a `{"v": ...}` cell.
fn decode_cell(cell: serde_json::Value) -> Result<FieldValue, AppError> {
    match cell {
        serde_json::Value::Object(mut obj) => {
            FieldValue::from_json(obj.remove("v").unwrap_or(serde_json::Value::Null))
        }
        other => Err(AppError::Internal(format!(
            "Malformed cell, expected object: {}",
            other
        ))),
    }
}

/// Ordered field values of one result row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub fields: Vec<FieldValue>,
}

impl Row {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Self { fields }
    }

    /// Convenience constructor for all-string rows.
    pub fn from_strings<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|v| FieldValue::Primitive(v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index)
    }

    pub(crate) fn from_wire(row: WireRow) -> Result<Self, AppError> {
        row.f
            .into_iter()
            .map(decode_cell)
            .collect::<Result<Vec<_>, _>>()
            .map(Row::new)
    }
}

/// Row exactly as returned on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct WireRow {
    #[serde(default)]
    pub f: Vec<serde_json::Value>,
}
