//! Row-to-record mapping.

use crate::bigquery::{FieldValue, Row};
use crate::error::AppError;

/// A user seen in the analytics events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: String,
    first_seen: String,
    platform: String,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        first_seen: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_seen: first_seen.into(),
            platform: platform.into(),
        }
    }

    /// Builds a user from columns 0, 1 and 2 of a row.
    ///
    /// # Errors
    ///
    /// `AppError::RowShape` if the row is narrower than three columns or one of
    /// those columns is not a non-null primitive.
    pub fn from_row(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: string_at(row, 0)?,
            first_seen: string_at(row, 1)?,
            platform: string_at(row, 2)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn first_seen(&self) -> &str {
        &self.first_seen
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }
}

fn string_at(row: &Row, index: usize) -> Result<String, AppError> {
    let value = row.get(index).ok_or_else(|| {
        AppError::RowShape(format!(
            "expected at least {} columns, row has {}",
            index + 1,
            row.len()
        ))
    })?;

    value.as_str().map(str::to_string).ok_or_else(|| {
        AppError::RowShape(format!(
            "column {} is {}, expected a string",
            index,
            value.kind()
        ))
    })
}

/// Every column of a row as a string, in order. Nulls become empty strings.
///
/// # Errors
///
/// `AppError::RowShape` for REPEATED or RECORD columns.
pub fn flatten_row(row: &Row) -> Result<Vec<String>, AppError> {
    row.fields
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            FieldValue::Primitive(s) => Ok(s.clone()),
            FieldValue::Null => Ok(String::new()),
            other => Err(AppError::RowShape(format!(
                "column {} is {}, cannot be flattened",
                index,
                other.kind()
            ))),
        })
        .collect()
}
