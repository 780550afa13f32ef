use std::sync::Arc;

/// An in-flight record flowing through the operator pipeline: column values
/// paired with equally many qualified column names (e.g. "Movies.title").
/// Immutable once constructed; the column-name sequence is shared between
/// all tuples of one stream.
#[derive(Debug, Clone)]
pub struct Tuple {
    values: Vec<String>,
    columns: Arc<[String]>,
}

impl Tuple {
    pub fn new(values: Vec<String>, columns: Arc<[String]>) -> Self {
        debug_assert_eq!(values.len(), columns.len());
        Self { values, columns }
    }

    /// The concatenated column names of a join of two streams
    pub fn joined_columns(left: &Tuple, right: &Tuple) -> Arc<[String]> {
        left.columns
            .iter()
            .chain(right.columns.iter())
            .cloned()
            .collect()
    }

    /// Join-compose two tuples under an already-computed column sequence
    pub fn join_with(left: &Tuple, right: &Tuple, columns: Arc<[String]>) -> Tuple {
        let mut values = Vec::with_capacity(left.values.len() + right.values.len());
        values.extend_from_slice(&left.values);
        values.extend_from_slice(&right.values);
        Tuple::new(values, columns)
    }

    /// Value of the named column, or `None` if the tuple has no such column
    pub fn value(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn columns_arc(&self) -> Arc<[String]> {
        self.columns.clone()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
