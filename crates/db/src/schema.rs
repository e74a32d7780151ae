//! Table schema: typed columns and field values.

use serde::{Deserialize, Serialize};

use openset_core::{hash_text, FIXED_POINT_SCALE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int,
    Double,
    Bool,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub index: usize,
    pub col_type: ColumnType,
}

/// Ordered, name-addressable column list for one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Columns {
    columns: Vec<Column>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor from `(name, type)` pairs.
    pub fn from_pairs(pairs: &[(&str, ColumnType)]) -> Self {
        let mut columns = Self::new();
        for (name, col_type) in pairs {
            columns.add(name, *col_type);
        }
        columns
    }

    pub fn add(&mut self, name: &str, col_type: ColumnType) -> usize {
        let index = self.columns.len();
        self.columns.push(Column {
            name: name.to_string(),
            index,
            col_type,
        });
        index
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn by_index(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }
}

/// One stored value. Doubles live here in natural units; query-time
/// comparisons scale them to fixed-point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view in fixed-point units (doubles scaled by 10,000, ints
    /// scaled likewise so the two are comparable). None for text.
    pub fn as_fixed(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(v * FIXED_POINT_SCALE),
            FieldValue::Double(v) => Some((v * FIXED_POINT_SCALE as f64) as i64),
            FieldValue::Bool(v) => Some(if *v { FIXED_POINT_SCALE } else { 0 }),
            FieldValue::Text(_) => None,
        }
    }

    /// Group-key view: numerics in fixed-point, text as its stable hash.
    pub fn group_key(&self) -> i64 {
        match self {
            FieldValue::Text(s) => hash_text(s),
            other => other.as_fixed().unwrap_or(0),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// One event in a person's timeline: a stamp plus sparse column values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub stamp: i64,
    pub values: Vec<(usize, FieldValue)>,
}

impl Event {
    pub fn value(&self, column: usize) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(index, _)| *index == column)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_resolve_by_name_and_index() {
        let columns = Columns::from_pairs(&[
            ("revenue", ColumnType::Double),
            ("country", ColumnType::Text),
        ]);
        assert_eq!(columns.get("country").unwrap().index, 1);
        assert_eq!(columns.by_index(0).unwrap().name, "revenue");
        assert!(columns.get("missing").is_none());
    }

    #[test]
    fn fixed_point_view_scales_numerics() {
        assert_eq!(FieldValue::Int(3).as_fixed(), Some(30_000));
        assert_eq!(FieldValue::Double(1.5).as_fixed(), Some(15_000));
        assert_eq!(FieldValue::Text("x".into()).as_fixed(), None);
    }

    #[test]
    fn group_key_hashes_text() {
        let key = FieldValue::Text("US".into()).group_key();
        assert_eq!(key, openset_core::hash_text("US"));
    }
}
