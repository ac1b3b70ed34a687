use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Value;

/// Column names of a result, shared by every row it produces.
#[derive(Debug, Default)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        // first occurrence wins for duplicated names (e.g. `SELECT a.id, b.id`)
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A row from a query result, addressable by column name or index.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(columns: Arc<Columns>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.columns
            .position(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index (0-based)
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_index() {
        let columns = Arc::new(Columns::new(vec!["id".into(), "name".into()]));
        let row = Row::new(columns, vec![Value::Int(1), Value::Text("alex".into())]);
        assert_eq!(row.get("name").and_then(Value::as_text), Some("alex"));
        assert_eq!(row.get_by_index(0), Some(&Value::Int(1)));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn duplicate_column_names_resolve_to_first() {
        let columns = Arc::new(Columns::new(vec!["id".into(), "id".into()]));
        let row = Row::new(columns, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
    }
}
