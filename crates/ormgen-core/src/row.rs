//! Database row representation.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator between a table alias and a column name in eager result sets.
pub const ALIAS_SEPARATOR: &str = "__";

/// Column metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row of one result set shares it.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a query.
///
/// Rows provide both index-based and name-based access to column values.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self::new(names, values)
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// View this row through a table alias (`<alias>__<column>`).
    pub fn aliased<'r>(&'r self, alias: &'r str) -> RowView<'r> {
        RowView {
            row: self,
            alias: Some(alias),
        }
    }

    /// View this row with plain column names.
    pub fn plain(&self) -> RowView<'_> {
        RowView {
            row: self,
            alias: None,
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Column lookup over one table's slice of a (possibly joined) row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'r> {
    row: &'r Row,
    alias: Option<&'r str>,
}

impl<'r> RowView<'r> {
    /// Look up a column by its unaliased name.
    pub fn get(&self, column: &str) -> Option<&'r Value> {
        match self.alias {
            None => self.row.get_by_name(column),
            Some(alias) => self
                .row
                .get_by_name(&format!("{alias}{ALIAS_SEPARATOR}{column}")),
        }
    }

    pub fn alias(&self) -> Option<&'r str> {
        self.alias
    }
}
