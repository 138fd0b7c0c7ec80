//! Result rows.

use crate::store::error::StoreError;

/// One result row: column names paired with their text values, in select
/// order. `None` is SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// Build a row from ordered column/value pairs.
    pub fn new(columns: Vec<(String, Option<String>)>) -> Self {
        Self { columns }
    }

    /// Single-column row holding an integer.
    pub fn single_int(column: &str, value: i64) -> Self {
        Self::new(vec![(column.to_string(), Some(value.to_string()))])
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in select order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Raw text value of a column. Missing columns and `NULL` both yield `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Decode a column as an integer.
    ///
    /// Returns `Ok(None)` for `NULL`, an error for a missing column or a
    /// non-integer value.
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, StoreError> {
        let (_, value) = self
            .columns
            .iter()
            .find(|(name, _)| name == column)
            .ok_or_else(|| StoreError::Decode {
                column: column.to_string(),
                reason: "no such column".to_string(),
            })?;

        match value {
            None => Ok(None),
            Some(text) => text
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| StoreError::Decode {
                    column: column.to_string(),
                    reason: format!("'{text}' is not an integer: {e}"),
                }),
        }
    }
}
