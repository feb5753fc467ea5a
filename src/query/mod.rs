mod filter;
mod path;
mod spec;

pub use filter::FilterExpr;
pub use path::JsonPath;
pub use spec::{ColumnSpec, ColumnSpecs, SpecError};

use crate::model::{HeaderColumn, MISSING_VALUE};
use crate::render::helpers::{age_since_rfc3339, format_bytes, parse_quantity};
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query {expr:?} at offset {offset}: {reason}")]
    Parse {
        expr: String,
        offset: usize,
        reason: String,
    },

    #[error("query evaluation failed: {0}")]
    Eval(String),

    #[error("invalid regex {pattern:?}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl QueryError {
    pub(crate) fn parse(expr: &str, offset: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            expr: expr.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn eval(reason: impl Into<String>) -> Self {
        Self::Eval(reason.into())
    }
}

/// A parsed column query. Expressions wrapped in parentheses run through the
/// filter interpreter, anything else is a structural path.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Path(JsonPath),
    Filter(FilterExpr),
}

impl Query {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let trimmed = raw.trim();
        if let Some(inner) = filter_body(trimmed) {
            return FilterExpr::parse(inner).map(Self::Filter);
        }
        JsonPath::parse(trimmed).map(Self::Path)
    }

    pub fn is_filter(&self) -> bool {
        matches!(self, Self::Filter(_))
    }

    pub fn evaluate(&self, object: &Value) -> Result<Vec<Value>, QueryError> {
        match self {
            Self::Path(path) => Ok(path.find(object).into_iter().cloned().collect()),
            Self::Filter(filter) => filter.evaluate(object),
        }
    }

    /// Evaluates and formats the matches for display: nothing matched gives
    /// the missing sentinel, several matches are comma joined.
    pub fn render(&self, object: &Value, column: &HeaderColumn) -> Result<String, QueryError> {
        let values = self.evaluate(object)?;
        let values = values
            .iter()
            .filter(|value| !(self.is_filter() && value.is_null()))
            .collect::<Vec<_>>();
        if values.is_empty() {
            return Ok(MISSING_VALUE.to_string());
        }

        Ok(values
            .into_iter()
            .map(|value| format_value(value, column))
            .collect::<Vec<_>>()
            .join(","))
    }
}

fn filter_body(raw: &str) -> Option<&str> {
    let inner = raw.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0usize;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return None,
            ')' => depth -= 1,
            _ => {}
        }
    }
    Some(inner)
}

/// Display form of a matched value, honouring the column's capacity and
/// time flags.
pub fn format_value(value: &Value, column: &HeaderColumn) -> String {
    let raw = match value {
        Value::String(text) => text.clone(),
        Value::Null => return MISSING_VALUE.to_string(),
        other => other.to_string(),
    };

    if column.capacity
        && let Some(bytes) = parse_quantity(&raw)
    {
        return format_bytes(bytes.round() as u64);
    }
    if column.time
        && let Some(age) = age_since_rfc3339(&raw, Utc::now())
    {
        return age;
    }

    raw
}
