use super::reader::Row;
use crate::error::RowShapeError;
use serde::Serialize;

/// Ordered field names captured from the first row of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    fields: Vec<String>,
}

impl Header {
    pub fn from_row(row: &Row) -> Self {
        Self {
            fields: row.iter().map(str::to_string).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.len() == self.fields.len()
    }

    /// Zip a data row against the header. Rows of a different width are
    /// rejected as a whole rather than paired up partially.
    pub fn name(&self, row: &Row) -> Result<NamedRecord, RowShapeError> {
        if !self.matches(row) {
            return Err(RowShapeError::FieldCount {
                expected: self.fields.len(),
                found: row.len(),
            });
        }
        let pairs = self
            .fields
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        Ok(NamedRecord { pairs })
    }
}

/// Field name to raw value pairs, kept in header order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedRecord {
    pairs: Vec<(String, String)>,
}

impl NamedRecord {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
