//! Query result types for askdb.
//!
//! Defines the structures used to represent query results from the database
//! and their textual rendering for the answer prompt.

use std::fmt;

/// Maximum number of rows rendered into the final-answer prompt.
pub const MAX_RESULT_ROWS_IN_PROMPT: usize = 50;

/// Represents the result of executing a SQL query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data.
    pub rows: Vec<Row>,

    /// Number of rows in the result (may be truncated).
    pub row_count: usize,

    /// Total number of rows before truncation (if known).
    pub total_rows: Option<usize>,

    /// Whether the result was truncated due to exceeding the fetch limit.
    pub was_truncated: bool,
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            total_rows: Some(row_count),
            was_truncated: false,
        }
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders the result as a compact text table for the answer prompt.
    ///
    /// The header line lists the column names, followed by one line per row.
    /// At most [`MAX_RESULT_ROWS_IN_PROMPT`] rows are included; a trailing
    /// note states how many were left out.
    pub fn format_for_prompt(&self) -> String {
        let header = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ");

        if self.rows.is_empty() {
            return if header.is_empty() {
                "(no rows)".to_string()
            } else {
                format!("{header}\n(no rows)")
            };
        }

        let mut lines = Vec::with_capacity(self.rows.len().min(MAX_RESULT_ROWS_IN_PROMPT) + 2);
        lines.push(header);
        lines.extend(
            self.rows
                .iter()
                .take(MAX_RESULT_ROWS_IN_PROMPT)
                .map(|row| {
                    row.iter()
                        .map(Value::to_display_string)
                        .collect::<Vec<_>>()
                        .join(" | ")
                }),
        );

        let total = self.total_rows.unwrap_or(self.row_count).max(self.rows.len());
        let shown = self.rows.len().min(MAX_RESULT_ROWS_IN_PROMPT);
        if total > shown {
            lines.push(format!("({} more rows not shown)", total - shown));
        }

        lines.join("\n")
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Declared or inferred column type.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// A single SQLite value (one of the five storage classes).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// INTEGER storage class.
    Int(i64),

    /// REAL storage class.
    Float(f64),

    /// TEXT storage class.
    Text(String),

    /// BLOB storage class.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value to its display representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn users_result(n: usize) -> QueryResult {
        let rows = (1..=n)
            .map(|i| vec![Value::Int(i as i64), Value::from(format!("user{i}"))])
            .collect();
        QueryResult::with_data(
            vec![ColumnInfo::new("id", "INTEGER"), ColumnInfo::new("name", "TEXT")],
            rows,
        )
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_display_string(), "NULL");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Float(2.5).to_display_string(), "2.5");
        assert_eq!(Value::from("hello").to_display_string(), "hello");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_display_string(), "<3 bytes>");
    }

    #[test]
    fn test_value_from_conversions() {
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(2.5f64), Value::Float(2.5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
        assert!(Value::from(None::<String>).is_null());
    }

    #[test]
    fn test_format_for_prompt() {
        assert_eq!(
            users_result(2).format_for_prompt(),
            "id | name\n1 | user1\n2 | user2"
        );
    }

    #[test]
    fn test_format_for_prompt_empty() {
        let result = QueryResult::with_data(vec![ColumnInfo::new("name", "TEXT")], vec![]);
        assert_eq!(result.format_for_prompt(), "name\n(no rows)");
        assert_eq!(QueryResult::new().format_for_prompt(), "(no rows)");
    }

    #[test]
    fn test_format_for_prompt_caps_rows() {
        let text = users_result(MAX_RESULT_ROWS_IN_PROMPT + 7).format_for_prompt();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), MAX_RESULT_ROWS_IN_PROMPT + 2);
        assert_eq!(lines.last(), Some(&"(7 more rows not shown)"));
    }

    #[test]
    fn test_format_for_prompt_reports_fetch_truncation() {
        let mut result = users_result(3);
        result.total_rows = Some(10);
        result.was_truncated = true;
        assert!(result
            .format_for_prompt()
            .ends_with("(7 more rows not shown)"));
    }

    #[test]
    fn test_with_data_counts_rows() {
        let result = users_result(4);
        assert_eq!(
            result,
            QueryResult {
                columns: vec![ColumnInfo::new("id", "INTEGER"), ColumnInfo::new("name", "TEXT")],
                rows: users_result(4).rows,
                row_count: 4,
                total_rows: Some(4),
                was_truncated: false,
            }
        );
        assert!(!result.is_empty());
    }
}
