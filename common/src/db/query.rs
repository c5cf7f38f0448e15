// Query model: bind parameters, result shapes and statement helpers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One result row, column name → value, in column order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A bind parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    Json(serde_json::Value),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Bind parameters for a single execution or for a batch
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParams {
    Single(Vec<SqlValue>),
    Batch(Vec<Vec<SqlValue>>),
}

/// A statement plus its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub params: QueryParams,
}

impl QueryRequest {
    pub fn single(query: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            query: query.into(),
            params: QueryParams::Single(params),
        }
    }

    pub fn batch(query: impl Into<String>, params_list: Vec<Vec<SqlValue>>) -> Self {
        Self {
            query: query.into(),
            params: QueryParams::Batch(params_list),
        }
    }

    /// Label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self.params {
            QueryParams::Batch(_) => "batch",
            QueryParams::Single(_) if is_read_statement(&self.query) => "read",
            QueryParams::Single(_) => "write",
        }
    }
}

/// Outcome of a statement: rows for reads, affected-row count for writes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResult {
    Rows(Vec<Row>),
    RowsAffected(u64),
}

impl QueryResult {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::RowsAffected(_) => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::RowsAffected(_) => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            QueryResult::RowsAffected(count) => Some(*count),
            QueryResult::Rows(_) => None,
        }
    }
}

const READ_KEYWORD: &str = "SELECT";

/// Textual read/write classification: leading whitespace trimmed, case-insensitive
/// `SELECT` prefix. Anything else (CTEs included) is treated as a write and committed.
pub fn is_read_statement(query: &str) -> bool {
    query
        .trim_start()
        .get(..READ_KEYWORD.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(READ_KEYWORD))
}

/// Rewrite DB-API `%s` placeholders into Postgres positional `$n` placeholders.
///
/// `%s` inside quoted literals and identifiers is left alone. `%%` collapses to a literal `%`
/// everywhere, quotes included. Statements that contain no `%s` are returned unchanged, so
/// native `$n` queries pass through.
pub fn rewrite_placeholders(query: &str) -> String {
    if !query.contains("%s") {
        return query.to_string();
    }

    let mut out = String::with_capacity(query.len() + 8);
    let mut chars = query.chars().peekable();
    let mut quote: Option<char> = None;
    let mut index = 0;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '%' && chars.peek() == Some(&'%') {
                chars.next();
            } else if c == q {
                quote = None;
            }
            out.push(c);
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '%' => match chars.peek() {
                Some('s') => {
                    chars.next();
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                _ => out.push('%'),
            },
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_read_statement_detection() {
        assert!(is_read_statement("SELECT * FROM t"));
        assert!(is_read_statement("  \n\tselect 1"));
        assert!(is_read_statement("SeLeCt id FROM t"));
        assert!(!is_read_statement("INSERT INTO t VALUES (1)"));
        assert!(!is_read_statement("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_read_statement("SELEC"));
        assert!(!is_read_statement(""));
    }

    #[test]
    fn test_read_statement_multibyte_prefix() {
        // Must not panic on a char boundary inside the first six bytes
        assert!(!is_read_statement("ñññ SELECT"));
    }

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(
            rewrite_placeholders("INSERT INTO t VALUES (%s, %s)"),
            "INSERT INTO t VALUES ($1, $2)"
        );
        assert_eq!(
            rewrite_placeholders("SELECT * FROM t WHERE a = %s AND b LIKE 'x%s' AND c LIKE 'y%%'"),
            "SELECT * FROM t WHERE a = $1 AND b LIKE 'x%s' AND c LIKE 'y%'"
        );
        assert_eq!(
            rewrite_placeholders("SELECT * FROM t WHERE a = %s AND b LIKE %s || '%%'"),
            "SELECT * FROM t WHERE a = $1 AND b LIKE $2 || '%'"
        );
        assert_eq!(
            rewrite_placeholders("SELECT * FROM t WHERE a = $1"),
            "SELECT * FROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_rewrite_collapses_escaped_percent_outside_literals() {
        assert_eq!(
            rewrite_placeholders("SELECT 10 %% 3, %s"),
            "SELECT 10 % 3, $1"
        );
    }

    #[test]
    fn test_rewrite_collapses_escaped_percent_inside_literals() {
        assert_eq!(
            rewrite_placeholders("INSERT INTO discounts (code, label) VALUES (%s, '100%%')"),
            "INSERT INTO discounts (code, label) VALUES ($1, '100%')"
        );
        // A quote character after the collapsed pair still closes the literal
        assert_eq!(
            rewrite_placeholders("SELECT '%%', %s"),
            "SELECT '%', $1"
        );
    }

    #[test]
    fn test_request_kind() {
        assert_eq!(QueryRequest::single("SELECT 1", vec![]).kind(), "read");
        assert_eq!(QueryRequest::single("UPDATE t SET a = 1", vec![]).kind(), "write");
        assert_eq!(QueryRequest::batch("SELECT 1", vec![]).kind(), "batch");
    }

    #[test]
    fn test_sql_value_from_json() {
        let values: Vec<SqlValue> =
            serde_json::from_value(serde_json::json!([null, true, 3, 1.5, "29AAACB1234F1Z5"]))
                .unwrap();
        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Bool(true),
                SqlValue::Int(3),
                SqlValue::Float(1.5),
                SqlValue::Text("29AAACB1234F1Z5".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_result_accessors() {
        let rows = QueryResult::Rows(vec![Row::new()]);
        assert_eq!(rows.rows().map(<[Row]>::len), Some(1));
        assert_eq!(rows.rows_affected(), None);
        assert_eq!(QueryResult::RowsAffected(3).rows_affected(), Some(3));
    }

    proptest! {
        #[test]
        fn prop_placeholder_count_matches(n in 0usize..20) {
            let query = format!(
                "INSERT INTO t VALUES ({})",
                vec!["%s"; n].join(", ")
            );
            let rewritten = rewrite_placeholders(&query);
            prop_assert!(!rewritten.contains("%s"));
            for i in 1..=n {
                let placeholder = format!("${}", i);
                prop_assert!(rewritten.contains(&placeholder));
            }
        }
    }
}
