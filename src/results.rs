use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// A row from a materialized result
///
/// Column names and the name-to-index lookup are shared by every row of the same table.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    column_index: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a new database row
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            rows,
            column_index,
        }
    }

    /// Get the index of a column by name
    ///
    /// Exact matches win; otherwise the lookup falls back to a case-insensitive scan, since
    /// several backends fold identifier case.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }
        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }
}

fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// A fully materialized table
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// The number of rows read into this table
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set
    ///
    /// Rows added before the column names are known are dropped.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let Some(row) = self.make_row(row_values) {
            self.results.push(row);
            self.rows_affected += 1;
        }
    }

    /// Build a row sharing this table's column layout without storing it.
    pub(crate) fn make_row(&self, row_values: Vec<RowValues>) -> Option<CustomDbRow> {
        let (column_names, column_index) = (self.column_names.as_ref()?, self.column_index.as_ref()?);
        Some(CustomDbRow {
            column_names: Arc::clone(column_names),
            rows: row_values,
            column_index: Arc::clone(column_index),
        })
    }

    /// Add an already-built row to the result set
    pub fn add_row(&mut self, row: CustomDbRow) {
        if self.column_names.is_none() {
            self.column_index = Some(Arc::clone(&row.column_index));
            self.column_names = Some(Arc::clone(&row.column_names));
        }
        self.results.push(row);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The first row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&CustomDbRow> {
        self.results.first()
    }

    /// Consume the table and keep only its first row.
    #[must_use]
    pub fn into_first_row(self) -> Option<CustomDbRow> {
        self.results.into_iter().next()
    }
}

/// Every result set produced by one command, in order.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub tables: Vec<ResultSet>,
}

impl RowSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    #[must_use]
    pub fn table(&self, index: usize) -> Option<&ResultSet> {
        self.tables.get(index)
    }

    pub fn push(&mut self, table: ResultSet) {
        self.tables.push(table);
    }
}

impl From<ResultSet> for RowSet {
    fn from(table: ResultSet) -> Self {
        RowSet {
            tables: vec![table],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[&str]) -> Arc<Vec<String>> {
        Arc::new(cols.iter().map(|c| (*c).to_string()).collect())
    }

    #[test]
    fn rows_share_column_lookup() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(names(&["id", "Name"]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        let row = rs.first().unwrap();
        assert_eq!(row.get("id"), Some(&RowValues::Int(1)));
        assert_eq!(row.get("name"), Some(&RowValues::Text("a".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn rows_without_columns_are_ignored() {
        let mut rs = ResultSet::default();
        rs.add_row_values(vec![RowValues::Int(1)]);
        assert!(rs.is_empty());
        assert!(rs.into_first_row().is_none());
    }
}
