use crate::delta::DeltaRow;
use crate::sort;
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::ops::Index;
use std::sync::Arc;
use tracing::warn;

/// Value rendered when a field does not apply or a column cannot be resolved.
pub const NA_VALUE: &str = "n/a";
/// Value rendered when a path query matched nothing.
pub const MISSING_VALUE: &str = "<none>";
pub const UNKNOWN_VALUE: &str = "<unknown>";
pub const ZERO_VALUE: &str = "0";

pub const AGE_COL: &str = "AGE";
pub const NAME_COL: &str = "NAME";
pub const NAMESPACE_COL: &str = "NAMESPACE";
pub const VALID_COL: &str = "VALID";
pub const LABELS_COL: &str = "LABELS";

pub const ALL_NAMESPACES: &str = "all";
pub const CLUSTER_SCOPE: &str = "-";

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl NamespaceScope {
    pub fn label(&self) -> String {
        match self {
            Self::All => ALL_NAMESPACES.to_string(),
            Self::Named(namespace) => namespace.clone(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Named(namespace) => Some(namespace.as_str()),
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "{ALL_NAMESPACES}"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

pub fn is_all_namespaces(ns: &str) -> bool {
    ns.is_empty() || ns == ALL_NAMESPACES
}

pub fn is_cluster_scoped(ns: &str) -> bool {
    ns == CLUSTER_SCOPE
}

pub fn is_namespaced(ns: &str) -> bool {
    !is_all_namespaces(ns) && !is_cluster_scoped(ns)
}

/// Builds the row identifier for a resource instance.
pub fn fqn(ns: &str, name: &str) -> String {
    if ns.is_empty() || is_cluster_scoped(ns) {
        name.to_string()
    } else {
        format!("{ns}/{name}")
    }
}

/// Splits a rendered `key=value,key=value` label cell. Malformed pairs are
/// dropped.
pub fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty() && !value.contains('='))
                .then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Align {
    #[default]
    Left,
    Right,
}

pub type Decorator = fn(&str) -> String;

#[derive(Debug, Clone, Default)]
pub struct HeaderColumn {
    pub name: String,
    pub align: Align,
    pub wide: bool,
    pub hide: bool,
    pub time: bool,
    pub capacity: bool,
    pub decorator: Option<Decorator>,
}

impl HeaderColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn right(mut self) -> Self {
        self.align = Align::Right;
        self
    }

    pub fn wide(mut self) -> Self {
        self.wide = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }

    pub fn time(mut self) -> Self {
        self.time = true;
        self
    }

    pub fn capacity(mut self) -> Self {
        self.capacity = true;
        self.align = Align::Right;
        self
    }

    pub fn decorated(mut self, decorator: Decorator) -> Self {
        self.decorator = Some(decorator);
        self
    }

    /// Folds built-in attributes into an operator-declared column. Explicit
    /// custom settings win, unset ones are taken from `builtin`.
    pub fn merge(&mut self, builtin: &HeaderColumn) {
        if self.align == Align::Left {
            self.align = builtin.align;
        }
        self.hide |= builtin.hide;
        self.time |= builtin.time;
        self.capacity |= builtin.capacity;
        if self.decorator.is_none() {
            self.decorator = builtin.decorator;
        }
    }

    pub fn decorate(&self, value: &str) -> String {
        match self.decorator {
            Some(decorator) => decorator(value),
            None => value.to_string(),
        }
    }
}

impl PartialEq for HeaderColumn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.align == other.align
            && self.wide == other.wide
            && self.hide == other.hide
            && self.time == other.time
            && self.capacity == other.capacity
            && self.decorator.is_some() == other.decorator.is_some()
    }
}

/// Ordered column schema of a table. Column names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header(Vec<HeaderColumn>);

impl Header {
    pub fn new(columns: Vec<HeaderColumn>) -> Self {
        Self(columns)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderColumn> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&HeaderColumn> {
        self.0.get(index)
    }

    pub fn push(&mut self, column: HeaderColumn) {
        self.0.push(column);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn index_of(&self, name: &str, include_wide: bool) -> Option<usize> {
        self.0
            .iter()
            .position(|column| (include_wide || !column.wide) && column.name == name)
    }

    pub fn column_names(&self, wide: bool) -> Vec<&str> {
        self.0
            .iter()
            .filter(|column| wide || !column.wide)
            .map(|column| column.name.as_str())
            .collect()
    }

    /// Maps requested column names to source indices. Unknown names map to
    /// `None`. In wide mode every remaining index is appended in order.
    pub fn map_indices<S: AsRef<str>>(&self, columns: &[S], wide: bool) -> Vec<Option<usize>> {
        let mut indices = Vec::with_capacity(self.len());
        let mut seen = HashSet::with_capacity(columns.len());
        for column in columns {
            let index = self.index_of(column.as_ref(), true);
            match index {
                Some(index) => {
                    seen.insert(index);
                }
                None => warn!("column {:?} not found on resource", column.as_ref()),
            }
            indices.push(index);
        }
        if !wide {
            return indices;
        }

        indices.extend((0..self.len()).filter(|index| !seen.contains(index)).map(Some));
        indices
    }

    pub fn customize<S: AsRef<str>>(&self, columns: &[S], wide: bool) -> Header {
        if columns.is_empty() {
            return self.clone();
        }

        let mut customized = Vec::with_capacity(self.len());
        let mut seen = HashSet::with_capacity(columns.len());
        for name in columns {
            let name = name.as_ref();
            let Some(index) = self.index_of(name, true) else {
                warn!("column {name:?} is not available on this resource");
                customized.push(HeaderColumn::new(name));
                continue;
            };
            seen.insert(index);
            let mut column = self.0[index].clone();
            column.wide = false;
            customized.push(column);
        }
        if !wide {
            return Header(customized);
        }

        for (index, column) in self.0.iter().enumerate() {
            if seen.contains(&index) {
                continue;
            }
            let mut column = column.clone();
            column.wide = true;
            customized.push(column);
        }

        Header(customized)
    }

    pub fn diff(&self, other: &Header) -> bool {
        self != other
    }

    pub fn has_age(&self) -> bool {
        self.age_index().is_some()
    }

    pub fn age_index(&self) -> Option<usize> {
        self.index_of(AGE_COL, true)
    }

    pub fn is_time_col(&self, index: usize) -> bool {
        self.0.get(index).is_some_and(|column| column.time)
    }

    pub fn is_capacity_col(&self, index: usize) -> bool {
        self.0.get(index).is_some_and(|column| column.capacity)
    }

    pub fn valid_col_index(&self) -> Option<usize> {
        self.index_of(VALID_COL, true)
    }

    /// Keeps the columns at `columns` and appends one column per label key.
    pub fn labelize<S: AsRef<str>>(&self, columns: &[usize], labels: &[S]) -> Header {
        let mut labelized = columns
            .iter()
            .filter_map(|index| self.0.get(*index))
            .map(|column| {
                let mut column = column.clone();
                column.wide = false;
                column
            })
            .collect::<Vec<_>>();
        labelized.extend(labels.iter().map(|label| HeaderColumn::new(label.as_ref())));
        Header(labelized)
    }

    /// Indices the UI should paint: hidden columns never, wide columns only
    /// in wide mode, NAMESPACE only when more than one namespace is shown.
    pub fn visible_indices(&self, ns: &str, wide: bool) -> Vec<usize> {
        let namespaced = is_namespaced(ns);
        self.0
            .iter()
            .enumerate()
            .filter(|(_, column)| {
                !column.hide
                    && (wide || !column.wide)
                    && !(namespaced && column.name == NAMESPACE_COL)
            })
            .map(|(index, _)| index)
            .collect()
    }
}

impl Index<usize> for Header {
    type Output = HeaderColumn;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl FromIterator<HeaderColumn> for Header {
    fn from_iter<T: IntoIterator<Item = HeaderColumn>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = &'a HeaderColumn;
    type IntoIter = std::slice::Iter<'a, HeaderColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub type Fields = Vec<String>;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Row {
    pub id: String,
    pub fields: Fields,
}

impl Row {
    pub fn new(size: usize) -> Self {
        Self {
            id: String::new(),
            fields: vec![String::new(); size],
        }
    }

    pub fn with_fields<S: Into<String>>(id: impl Into<String>, fields: Vec<S>) -> Self {
        Self {
            id: id.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn customize(&self, columns: &[Option<usize>]) -> Row {
        let fields = columns
            .iter()
            .map(|column| match column {
                Some(index) => self.fields.get(*index).cloned().unwrap_or_default(),
                None => NA_VALUE.to_string(),
            })
            .collect();

        Row {
            id: self.id.clone(),
            fields,
        }
    }

    pub fn labelize<S: AsRef<str>>(&self, columns: &[usize], label_col: usize, labels: &[S]) -> Row {
        let values = parse_labels(self.fields.get(label_col).map_or("", String::as_str));
        let mut fields = columns
            .iter()
            .map(|index| self.fields.get(*index).cloned().unwrap_or_default())
            .collect::<Vec<_>>();
        fields.extend(
            labels
                .iter()
                .map(|label| values.get(label.as_ref()).cloned().unwrap_or_default()),
        );

        Row {
            id: self.id.clone(),
            fields,
        }
    }

    pub fn diff(&self, other: &Row, age_col: Option<usize>) -> bool {
        if self.id != other.id {
            return true;
        }
        fields_differ(&self.fields, &other.fields, age_col)
    }
}

pub type Rows = Vec<Row>;

pub(crate) fn fields_differ(left: &[String], right: &[String], skip: Option<usize>) -> bool {
    if left.len() != right.len() {
        return true;
    }
    left.iter()
        .zip(right)
        .enumerate()
        .any(|(index, (l, r))| Some(index) != skip && l != r)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResEvent {
    Unchanged,
    Add,
    Update,
    Delete,
    Clear,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RowEvent {
    pub kind: ResEvent,
    pub row: Row,
    pub deltas: DeltaRow,
}

impl RowEvent {
    pub fn new(kind: ResEvent, row: Row) -> Self {
        let deltas = DeltaRow::blank(row.len());
        Self { kind, row, deltas }
    }

    pub fn with_deltas(row: Row, deltas: DeltaRow) -> Self {
        Self {
            kind: ResEvent::Update,
            row,
            deltas,
        }
    }

    pub fn customize(&self, columns: &[Option<usize>]) -> RowEvent {
        RowEvent {
            kind: self.kind,
            row: self.row.customize(columns),
            deltas: self.deltas.customize(columns),
        }
    }

    pub fn labelize<S: AsRef<str>>(
        &self,
        columns: &[usize],
        label_col: usize,
        labels: &[S],
    ) -> RowEvent {
        RowEvent {
            kind: self.kind,
            row: self.row.labelize(columns, label_col, labels),
            deltas: self.deltas.labelize(columns, label_col, &self.row, labels),
        }
    }

    pub fn diff(&self, other: &RowEvent, age_col: Option<usize>) -> bool {
        self.kind != other.kind
            || self.deltas.diff(&other.deltas, age_col)
            || self.row.diff(&other.row, age_col)
    }
}

/// Ordered row events with an id lookup index. Events are shared behind
/// `Arc` so snapshots only copy pointers; an event is never mutated once
/// stored, only replaced.
#[derive(Debug, Clone, Default)]
pub struct RowEvents {
    events: Vec<Arc<RowEvent>>,
    index: HashMap<String, usize>,
}

impl RowEvents {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowEvent> {
        self.events.iter().map(AsRef::as_ref)
    }

    pub fn at(&self, index: usize) -> Option<&RowEvent> {
        self.events.get(index).map(AsRef::as_ref)
    }

    pub fn get(&self, id: &str) -> Option<&RowEvent> {
        self.find_index(id).and_then(|index| self.at(index))
    }

    pub fn find_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn add(&mut self, event: RowEvent) {
        self.index.insert(event.row.id.clone(), self.events.len());
        self.events.push(Arc::new(event));
    }

    pub fn set(&mut self, index: usize, event: RowEvent) {
        if index >= self.events.len() {
            self.add(event);
            return;
        }
        self.index.insert(event.row.id.clone(), index);
        self.events[index] = Arc::new(event);
    }

    pub fn upsert(&mut self, event: RowEvent) {
        match self.find_index(&event.row.id) {
            Some(index) => self.set(index, event),
            None => self.add(event),
        }
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        let Some(victim) = self.index.remove(id) else {
            anyhow::bail!("unable to delete row with id {id:?}");
        };
        self.events.remove(victim);
        self.reindex();
        Ok(())
    }

    /// Drops every event whose id is not in `keep` in a single pass and
    /// returns the number of removed events.
    pub fn retain_ids(&mut self, keep: &HashSet<&str>) -> usize {
        let before = self.events.len();
        self.events
            .retain(|event| keep.contains(event.row.id.as_str()));
        let removed = before - self.events.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.index.clear();
    }

    pub fn customize(&self, columns: &[Option<usize>]) -> RowEvents {
        self.iter().map(|event| event.customize(columns)).collect()
    }

    pub fn labelize<S: AsRef<str>>(
        &self,
        columns: &[usize],
        label_col: usize,
        labels: &[S],
    ) -> RowEvents {
        self.iter()
            .map(|event| event.labelize(columns, label_col, labels))
            .collect()
    }

    pub fn diff(&self, other: &RowEvents, age_col: Option<usize>) -> bool {
        if self.len() != other.len() {
            return true;
        }
        self.iter()
            .zip(other.iter())
            .any(|(left, right)| left.diff(right, age_col))
    }

    pub fn sort(
        &mut self,
        column: usize,
        is_duration: bool,
        is_number: bool,
        is_capacity: bool,
        asc: bool,
    ) {
        // Descending inverts the whole comparison, id tiebreak included.
        self.events.sort_by(|left, right| {
            let (id1, id2) = (left.row.id.as_str(), right.row.id.as_str());
            let ordering = match (left.row.fields.get(column), right.row.fields.get(column)) {
                (Some(v1), Some(v2)) => {
                    if sort::less(is_number, is_duration, is_capacity, id1, id2, v1, v2) {
                        Ordering::Less
                    } else if sort::less(is_number, is_duration, is_capacity, id2, id1, v2, v1) {
                        Ordering::Greater
                    } else {
                        Ordering::Equal
                    }
                }
                _ => sort::natural_cmp(id1, id2),
            };
            if asc { ordering } else { ordering.reverse() }
        });
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (position, event) in self.events.iter().enumerate() {
            self.index.insert(event.row.id.clone(), position);
        }
    }
}

impl FromIterator<RowEvent> for RowEvents {
    fn from_iter<T: IntoIterator<Item = RowEvent>>(iter: T) -> Self {
        let mut events = RowEvents::default();
        for event in iter {
            events.add(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Align, Header, HeaderColumn, NA_VALUE, ResEvent, Row, RowEvent, RowEvents, fqn,
        is_namespaced, parse_labels,
    };
    use std::collections::HashSet;

    fn header() -> Header {
        Header::new(vec![
            HeaderColumn::new("A"),
            HeaderColumn::new("B"),
            HeaderColumn::new("C").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    #[test]
    fn index_of_skips_wide_columns_unless_requested() {
        let header = header();
        assert_eq!(header.index_of("B", false), Some(1));
        assert_eq!(header.index_of("C", false), None);
        assert_eq!(header.index_of("C", true), Some(2));
        assert_eq!(header.index_of("Z", true), None);
    }

    #[test]
    fn column_names_filter_wide() {
        let header = header();
        assert_eq!(header.column_names(false), vec!["A", "B", "AGE"]);
        assert_eq!(header.column_names(true), vec!["A", "B", "C", "AGE"]);
    }

    #[test]
    fn customize_reorders_and_inserts_placeholders() {
        let header = header();
        let customized = header.customize(&["C", "FRED", "A"], false);
        assert_eq!(customized.column_names(true), vec!["C", "FRED", "A"]);
        assert!(!customized[0].wide);
        assert_eq!(customized[1], HeaderColumn::new("FRED"));
        assert_eq!(header.len(), 4);
        assert!(header[2].wide);
    }

    #[test]
    fn customize_wide_appends_remaining_columns_as_wide() {
        let header = header();
        let customized = header.customize(&["B"], true);
        assert_eq!(customized.column_names(true), vec!["B", "A", "C", "AGE"]);
        assert!(!customized[0].wide);
        assert!(customized.iter().skip(1).all(|column| column.wide));
    }

    #[test]
    fn customize_without_columns_is_identity() {
        let header = header();
        let names: [&str; 0] = [];
        assert_eq!(header.customize(&names, true), header);
    }

    #[test]
    fn map_indices_marks_unknown_columns() {
        let header = header();
        assert_eq!(header.map_indices(&["B", "Z"], false), vec![Some(1), None]);
        assert_eq!(
            header.map_indices(&["B"], true),
            vec![Some(1), Some(0), Some(2), Some(3)]
        );
    }

    #[test]
    fn row_customize_uses_na_for_unknown_columns() {
        let row = Row::with_fields("ns/a", vec!["a", "b", "c"]);
        let customized = row.customize(&[Some(2), None, Some(0)]);
        assert_eq!(customized.fields, vec!["c", NA_VALUE, "a"]);
        assert_eq!(customized.id, "ns/a");
    }

    #[test]
    fn row_diff_ignores_age_column() {
        let r1 = Row::with_fields("a", vec!["x", "1m"]);
        let r2 = Row::with_fields("a", vec!["x", "2m"]);
        assert!(!r1.diff(&r2, Some(1)));
        assert!(r1.diff(&r2, None));
    }

    #[test]
    fn visible_indices_hide_namespace_in_namespaced_scope() {
        let header = Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("IP").wide(),
            HeaderColumn::new("SECRET").hidden(),
        ]);
        assert_eq!(header.visible_indices("default", false), vec![1]);
        assert_eq!(header.visible_indices("all", true), vec![0, 1, 2]);
    }

    #[test]
    fn merge_keeps_custom_attributes() {
        let mut custom = HeaderColumn::new("MEM").wide();
        custom.merge(&HeaderColumn::new("MEM").capacity());
        assert!(custom.wide);
        assert!(custom.capacity);
        assert_eq!(custom.align, Align::Right);
    }

    #[test]
    fn row_events_track_index_across_deletes() {
        let mut events: RowEvents = ["a", "b", "c"]
            .into_iter()
            .map(|id| RowEvent::new(ResEvent::Add, Row::with_fields(id, vec![id])))
            .collect();
        events.delete("a").unwrap();
        assert_eq!(events.find_index("c"), Some(1));
        assert!(events.delete("zorg").is_err());

        let keep = HashSet::from(["c"]);
        assert_eq!(events.retain_ids(&keep), 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events.find_index("c"), Some(0));
    }

    #[test]
    fn row_events_sort_breaks_ties_by_id_in_sort_direction() {
        let mut events: RowEvents = [("b", "1"), ("a", "1"), ("c", "0")]
            .into_iter()
            .map(|(id, value)| RowEvent::new(ResEvent::Add, Row::with_fields(id, vec![value])))
            .collect();

        events.sort(0, false, true, false, true);
        let ids = events.iter().map(|event| event.row.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "a", "b"]);

        events.sort(0, false, true, false, false);
        let ids = events.iter().map(|event| event.row.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(events.find_index("c"), Some(2));
    }

    #[test]
    fn fqn_and_scope_helpers() {
        assert_eq!(fqn("ns", "pod"), "ns/pod");
        assert_eq!(fqn("-", "node1"), "node1");
        assert!(is_namespaced("default"));
        assert!(!is_namespaced("all"));
        assert!(!is_namespaced("-"));
    }

    #[test]
    fn label_cells_parse_into_pairs() {
        let labels = parse_labels("app=web, tier=front,broken,a=b=c,=x");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["app"], "web");
        assert_eq!(labels["tier"], "front");
        assert!(parse_labels("").is_empty());
    }

    #[test]
    fn labelize_keeps_identity_columns_and_adds_label_keys() {
        let header = Header::new(vec![
            HeaderColumn::new("NAME"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("AGE").time(),
        ]);
        let labelized = header.labelize(&[0], &["app", "tier"]);
        assert_eq!(labelized.column_names(false), vec!["NAME", "app", "tier"]);

        let row = Row::with_fields("ns/web", vec!["web", "app=web,zone=a", "5m"]);
        let event = RowEvent::new(ResEvent::Update, row).labelize(&[0], 1, &["app", "tier"]);
        assert_eq!(event.row.fields, vec!["web", "web", ""]);
        assert_eq!(event.kind, ResEvent::Update);
        assert!(event.deltas.is_blank());
        assert_eq!(event.deltas.len(), 3);
    }
}
