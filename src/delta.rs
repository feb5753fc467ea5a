use crate::model::{Header, MISSING_VALUE, Row, fields_differ, parse_labels};

/// Previous field values of a row, recorded only where they changed.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DeltaRow(Vec<String>);

impl DeltaRow {
    /// Diffs two renditions of the same instance. Time columns are skipped
    /// since they move on every refresh.
    pub fn new(old: &Row, new: &Row, header: &Header) -> Self {
        let deltas = new
            .fields
            .iter()
            .enumerate()
            .map(|(index, value)| match old.fields.get(index) {
                Some(previous) if previous != value && !header.is_time_col(index) => {
                    previous.clone()
                }
                _ => String::new(),
            })
            .collect();

        Self(deltas)
    }

    pub fn blank(size: usize) -> Self {
        Self(vec![String::new(); size])
    }

    pub fn from_fields<S: Into<String>>(fields: Vec<S>) -> Self {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.iter().all(String::is_empty)
    }

    pub fn diff(&self, other: &DeltaRow, age_col: Option<usize>) -> bool {
        fields_differ(&self.0, &other.0, age_col)
    }

    pub fn customize(&self, columns: &[Option<usize>]) -> DeltaRow {
        if self.is_blank() {
            return DeltaRow::blank(columns.len());
        }
        let deltas = columns
            .iter()
            .map(|column| {
                column
                    .and_then(|index| self.0.get(index).cloned())
                    .unwrap_or_default()
            })
            .collect();

        DeltaRow(deltas)
    }

    /// Projects deltas the way `Row::labelize` projects fields. A label
    /// that appeared since the previous snapshot records `<none>`.
    pub fn labelize<S: AsRef<str>>(
        &self,
        columns: &[usize],
        label_col: usize,
        current: &Row,
        labels: &[S],
    ) -> DeltaRow {
        if self.is_blank() {
            return DeltaRow::blank(columns.len() + labels.len());
        }

        let mut deltas = columns
            .iter()
            .map(|index| self.0.get(*index).cloned().unwrap_or_default())
            .collect::<Vec<_>>();
        let previous = self
            .0
            .get(label_col)
            .filter(|value| !value.is_empty())
            .map(|value| parse_labels(value));
        let current = parse_labels(current.fields.get(label_col).map_or("", String::as_str));
        deltas.extend(labels.iter().map(|label| {
            let Some(previous) = &previous else {
                return String::new();
            };
            let (old, new) = (previous.get(label.as_ref()), current.get(label.as_ref()));
            if old == new {
                String::new()
            } else {
                old.cloned().unwrap_or_else(|| MISSING_VALUE.to_string())
            }
        }));

        DeltaRow(deltas)
    }
}
