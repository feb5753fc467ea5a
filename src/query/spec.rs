use super::{Query, QueryError};
use crate::model::{Align, Header, HeaderColumn, NA_VALUE, Row};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

const FLAGS: &str = "NTWLRH";

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("invalid column definition {0:?}")]
    Invalid(String),

    #[error("invalid column name {name:?} in {spec:?}")]
    InvalidName { spec: String, name: String },

    #[error("invalid query for column {name:?}")]
    Query {
        name: String,
        #[source]
        source: QueryError,
    },

    #[error("duplicate column {0:?}")]
    Duplicate(String),
}

/// One operator column: `NAME[:QUERY][|FLAGS]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub header: HeaderColumn,
    pub path: String,
    query: Option<Query>,
}

impl ColumnSpec {
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        let spec = raw.trim();
        if spec.is_empty() {
            return Err(SpecError::Invalid(raw.to_string()));
        }

        let (body, flags) = split_flags(spec);
        let (name, path) = body
            .split_once(':')
            .map_or((body.trim(), ""), |(name, path)| (name.trim(), path.trim()));
        if name.is_empty() {
            return Err(SpecError::Invalid(raw.to_string()));
        }
        if !name.chars().all(is_name_char) {
            return Err(SpecError::InvalidName {
                spec: raw.to_string(),
                name: name.to_string(),
            });
        }

        let mut header = HeaderColumn::new(name);
        for flag in flags.chars() {
            header = match flag {
                'N' => header.capacity(),
                'T' => header.time(),
                'W' => header.wide(),
                'R' => header.right(),
                'H' => header.hidden(),
                _ => {
                    header.align = Align::Left;
                    header
                }
            };
        }

        let query = if path.is_empty() {
            None
        } else {
            Some(Query::parse(path).map_err(|source| SpecError::Query {
                name: name.to_string(),
                source,
            })?)
        };

        Ok(Self {
            header,
            path: path.to_string(),
            query,
        })
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '%' | '/' | '_' | '-')
}

/// Splits at the last `|` outside brackets, parentheses and quotes, and only
/// when everything after it is a flag letter. Pipes inside filter
/// expressions stay part of the query.
fn split_flags(spec: &str) -> (&str, &str) {
    let mut depth = 0i32;
    let mut quote = None;
    let mut last = None;
    for (index, c) in spec.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, '|') if depth == 0 => last = Some(index),
            _ => {}
        }
    }

    let Some(index) = last else {
        return (spec, "");
    };
    let flags = &spec[index + 1..];
    if flags.chars().all(|flag| FLAGS.contains(flag)) {
        (&spec[..index], flags)
    } else {
        (spec, "")
    }
}

/// The operator column list configured for one view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSpecs(Vec<ColumnSpec>);

impl ColumnSpecs {
    pub fn parse<S: AsRef<str>>(columns: &[S]) -> Result<Self, SpecError> {
        let mut specs = Vec::with_capacity(columns.len());
        let mut seen = HashSet::with_capacity(columns.len());
        for column in columns {
            let spec = ColumnSpec::parse(column.as_ref())?;
            if !seen.insert(spec.name().to_string()) {
                return Err(SpecError::Duplicate(spec.name().to_string()));
            }
            specs.push(spec);
        }

        Ok(Self(specs))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnSpec> {
        self.0.iter()
    }

    /// Custom columns first, merged with same-named built-ins, then every
    /// remaining built-in column marked wide.
    pub fn header(&self, builtin: &Header) -> Header {
        let mut columns = self
            .0
            .iter()
            .map(|spec| spec.header.clone())
            .collect::<Vec<_>>();
        let custom = columns.len();
        for column in builtin {
            if let Some(existing) = columns[..custom]
                .iter_mut()
                .find(|existing| existing.name == column.name)
            {
                existing.merge(column);
                continue;
            }
            let mut column = column.clone();
            column.wide = true;
            columns.push(column);
        }

        Header::new(columns)
    }

    /// Rebuilds a rendered row in the layout of [`ColumnSpecs::header`].
    /// Query failures are logged and fall back to the built-in value.
    pub fn realize(&self, object: &Value, builtin: &Header, row: &Row) -> Row {
        let builtin_value = |name: &str| {
            builtin
                .index_of(name, true)
                .and_then(|index| row.fields.get(index).cloned())
        };

        let mut fields = Vec::with_capacity(self.len() + builtin.len());
        for spec in &self.0 {
            let Some(query) = &spec.query else {
                fields.push(builtin_value(spec.name()).unwrap_or_else(|| {
                    warn!("unable to find custom column {:?}", spec.name());
                    NA_VALUE.to_string()
                }));
                continue;
            };
            let value = match query.render(object, &spec.header) {
                Ok(value) => value,
                Err(error) => {
                    warn!(
                        "custom column {:?} failed for {}: {error}",
                        spec.name(),
                        row.id
                    );
                    builtin_value(spec.name()).unwrap_or_else(|| NA_VALUE.to_string())
                }
            };
            fields.push(value);
        }

        let names = self.0.iter().map(ColumnSpec::name).collect::<HashSet<_>>();
        fields.extend(
            builtin
                .iter()
                .enumerate()
                .filter(|(_, column)| !names.contains(column.name.as_str()))
                .map(|(index, _)| {
                    row.fields
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| NA_VALUE.to_string())
                }),
        );

        Row {
            id: row.id.clone(),
            fields,
        }
    }
}

impl<'a> IntoIterator for &'a ColumnSpecs {
    type Item = &'a ColumnSpec;
    type IntoIter = std::slice::Iter<'a, ColumnSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
