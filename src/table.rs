use crate::delta::DeltaRow;
use crate::model::{
    AGE_COL, Align, Header, LABELS_COL, NAME_COL, NAMESPACE_COL, ResEvent, RowEvent, RowEvents,
    Rows, is_all_namespaces, is_namespaced,
};
use crate::query::ColumnSpecs;
use crate::render::{Renderer, hydrate, rows_only};
use crate::sort::SortColumn;
use anyhow::Result;
use regex::RegexBuilder;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, warn};

const FUZZY_PREFIX: &str = "-f ";

/// Row selection applied on top of a table snapshot.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct FilterOpts {
    /// Only keep rows flagged by their health check.
    pub toast: bool,
    pub query: String,
}

impl FilterOpts {
    pub fn is_empty(&self) -> bool {
        !self.toast && self.query.trim().is_empty()
    }
}

/// The reconciled state of one resource table: its header, the row events of
/// the latest snapshot and the namespace scope it was rendered for.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    header: Header,
    row_events: RowEvents,
    namespace: String,
}

impl TableData {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn row_events(&self) -> &RowEvents {
        &self.row_events
    }

    pub fn row_count(&self) -> usize {
        self.row_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_events.is_empty()
    }

    /// Classifies a full snapshot against the retained rows. Rows missing
    /// from `rows` are dropped in one pass at the end.
    pub fn update(&mut self, rows: Rows) {
        let started = Instant::now();
        let ids = rows
            .iter()
            .map(|row| row.id.clone())
            .collect::<HashSet<_>>();

        if self.row_events.is_empty() {
            for row in rows {
                self.row_events.upsert(RowEvent::new(ResEvent::Add, row));
            }
        } else {
            for row in rows {
                let event = match self.row_events.get(&row.id) {
                    None => RowEvent::new(ResEvent::Add, row),
                    Some(previous) => {
                        let deltas = DeltaRow::new(&previous.row, &row, &self.header);
                        if deltas.is_blank() {
                            RowEvent::new(ResEvent::Unchanged, row)
                        } else {
                            RowEvent::with_deltas(row, deltas)
                        }
                    }
                };
                self.row_events.upsert(event);
            }
        }

        let keep = ids.iter().map(String::as_str).collect::<HashSet<_>>();
        let removed = self.row_events.retain_ids(&keep);
        debug!(
            "reconciled {} rows ({removed} removed) in {:?}",
            self.row_events.len(),
            started.elapsed()
        );
    }

    /// Renders `objects`, applies the custom columns and reconciles the
    /// result. A changed column layout restarts the table from scratch.
    pub fn reconcile(
        &mut self,
        renderer: &dyn Renderer,
        specs: &ColumnSpecs,
        objects: &[Value],
    ) -> Result<()> {
        let builtin = renderer.header(&self.namespace);
        let rendered = hydrate(&self.namespace, objects, renderer);
        let (header, rows) = if specs.is_empty() {
            (builtin, rows_only(rendered))
        } else {
            let rows = rendered
                .into_iter()
                .map(|(index, row)| specs.realize(&objects[index], &builtin, &row))
                .collect();
            (specs.header(&builtin), rows)
        };
        if header.is_empty() {
            anyhow::bail!("renderer produced an empty header for {:?}", self.namespace);
        }

        if self.header.diff(&header) {
            self.row_events.clear();
            self.header = header;
        }
        self.update(rows);
        Ok(())
    }

    pub fn delete(&mut self, id: &str) {
        if let Err(error) = self.row_events.delete(id) {
            warn!("{error:#}");
        }
    }

    pub fn clear(&mut self) {
        self.header.clear();
        self.row_events.clear();
    }

    pub fn reset(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
        self.clear();
    }

    /// True when anything a viewer would notice changed. Age values alone
    /// do not count.
    pub fn diff(&self, other: &TableData) -> bool {
        self.namespace != other.namespace
            || self.header.diff(&other.header)
            || self
                .row_events
                .diff(&other.row_events, self.header.age_index())
    }

    /// Projects the table onto the named columns. The receiver is left as is.
    pub fn customize<S: AsRef<str>>(&self, columns: &[S], wide: bool) -> TableData {
        if columns.is_empty() {
            return self.clone();
        }

        let indices = self.header.map_indices(columns, wide);
        TableData {
            header: self.header.customize(columns, wide),
            row_events: self.row_events.customize(&indices),
            namespace: self.namespace.clone(),
        }
    }

    /// Replaces the regular columns with one column per label key, read
    /// from the LABELS column. NAME stays, and NAMESPACE too unless the table
    /// is scoped to a single namespace. Tables without labels come back as is.
    pub fn labelize<S: AsRef<str>>(&self, labels: &[S]) -> TableData {
        let Some(label_col) = self.header.index_of(LABELS_COL, true) else {
            return self.clone();
        };
        if labels.is_empty() {
            return self.clone();
        }

        let mut columns = Vec::with_capacity(2);
        if !is_namespaced(&self.namespace)
            && let Some(index) = self.header.index_of(NAMESPACE_COL, true)
        {
            columns.push(index);
        }
        if let Some(index) = self.header.index_of(NAME_COL, true) {
            columns.push(index);
        }

        TableData {
            header: self.header.labelize(&columns, labels),
            row_events: self.row_events.labelize(&columns, label_col, labels),
            namespace: self.namespace.clone(),
        }
    }

    pub fn filter(&self, opts: &FilterOpts) -> TableData {
        let mut table = self.clone();
        if opts.toast {
            table = table.toast_filter();
        }

        let query = opts.query.trim();
        if query.is_empty() {
            return table;
        }
        if let Some(fuzzy) = query.strip_prefix(FUZZY_PREFIX) {
            return table.fuzzy_filter(fuzzy.trim());
        }
        table.regex_filter(query)
    }

    fn toast_filter(&self) -> TableData {
        let Some(valid) = self.header.valid_col_index() else {
            return self.clone();
        };
        self.with_events(|event| {
            event
                .row
                .fields
                .get(valid)
                .is_some_and(|value| !value.trim().is_empty())
        })
    }

    fn fuzzy_filter(&self, query: &str) -> TableData {
        let needle = query.to_lowercase();
        self.with_events(|event| is_subsequence(&needle, &event.row.id.to_lowercase()))
    }

    fn regex_filter(&self, query: &str) -> TableData {
        let (inverse, pattern) = match query.strip_prefix('!') {
            Some(pattern) => (true, pattern),
            None => (false, query),
        };
        let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => regex,
            Err(error) => {
                warn!("invalid filter {pattern:?}: {error}");
                return self.clone();
            }
        };

        let skip_namespace = is_namespaced(&self.namespace);
        let searchable = self
            .header
            .iter()
            .enumerate()
            .filter(|(_, column)| {
                column.name != AGE_COL && !(skip_namespace && column.name == NAMESPACE_COL)
            })
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        self.with_events(|event| {
            let matched = searchable.iter().any(|index| {
                event
                    .row
                    .fields
                    .get(*index)
                    .is_some_and(|value| regex.is_match(value))
            });
            matched != inverse
        })
    }

    fn with_events(&self, keep: impl Fn(&RowEvent) -> bool) -> TableData {
        TableData {
            header: self.header.clone(),
            row_events: self
                .row_events
                .iter()
                .filter(|event| keep(event))
                .cloned()
                .collect(),
            namespace: self.namespace.clone(),
        }
    }

    pub fn sort(&mut self, column: &SortColumn) {
        let Some(index) = self.header.index_of(&column.name, true) else {
            warn!("unable to sort on unknown column {:?}", column.name);
            return;
        };
        let header = &self.header[index];
        let is_number = header.align == Align::Right;
        let (is_duration, is_capacity) = (header.time, header.capacity);
        self.row_events
            .sort(index, is_duration, is_number, is_capacity, column.asc);
    }

    pub fn default_sort_column(&self, configured: Option<&SortColumn>) -> SortColumn {
        if let Some(column) = configured.filter(|column| !column.is_blank())
            && self.header.index_of(&column.name, true).is_some()
        {
            return column.clone();
        }
        if is_all_namespaces(&self.namespace) && self.header.index_of(NAMESPACE_COL, true).is_some()
        {
            return SortColumn::new(NAMESPACE_COL, true);
        }
        if self.header.index_of(NAME_COL, true).is_some() {
            return SortColumn::new(NAME_COL, true);
        }
        self.header
            .get(0)
            .map(|column| SortColumn::new(column.name.clone(), true))
            .unwrap_or_default()
    }
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|wanted| chars.any(|c| c == wanted))
}

/// Single-writer, many-reader handle on a table. Readers take cheap
/// snapshots; the writer holds the lock for a whole reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct SharedTable(Arc<RwLock<TableData>>);

impl SharedTable {
    pub fn new(table: TableData) -> Self {
        Self(Arc::new(RwLock::new(table)))
    }

    pub fn snapshot(&self) -> TableData {
        self.read().clone()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TableData> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TableData> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterOpts, SharedTable, TableData};
    use crate::model::{Header, HeaderColumn, NA_VALUE, ResEvent, Row};
    use crate::query::ColumnSpecs;
    use crate::render::{Generic, PodRenderer, Renderer};
    use crate::sort::SortColumn;
    use serde_json::json;

    fn header() -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("READY"),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn row(ns: &str, name: &str, ready: &str, valid: &str, age: &str) -> Row {
        Row::with_fields(format!("{ns}/{name}"), vec![ns, name, ready, valid, age])
    }

    fn table(rows: Vec<Row>) -> TableData {
        let mut table = TableData::new("all");
        table.set_header(header());
        table.update(rows);
        table
    }

    fn ids(table: &TableData) -> Vec<String> {
        table
            .row_events()
            .iter()
            .map(|event| event.row.id.clone())
            .collect()
    }

    #[test]
    fn first_snapshot_is_all_adds() {
        let table = table(vec![row("ns", "a", "1/1", "", "1m"), row("ns", "b", "1/1", "", "2m")]);
        assert_eq!(table.row_count(), 2);
        assert!(table.row_events().iter().all(|event| event.kind == ResEvent::Add));
    }

    #[test]
    fn update_is_idempotent() {
        let rows = vec![row("ns", "a", "1/1", "", "1m"), row("ns", "b", "0/1", "", "2m")];
        let mut table = table(rows.clone());
        table.update(rows.clone());
        table.update(rows);
        assert_eq!(table.row_count(), 2);
        for event in table.row_events().iter() {
            assert_eq!(event.kind, ResEvent::Unchanged);
            assert!(event.deltas.is_blank());
        }
    }

    #[test]
    fn update_records_deltas_but_ignores_age() {
        let mut table = TableData::new("all");
        table.set_header(Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("READY"),
            HeaderColumn::new("AGE").time(),
        ]));
        table.update(vec![Row::with_fields("ns/pod1", vec!["ns", "pod1", "0/1", "10s"])]);
        table.update(vec![Row::with_fields("ns/pod1", vec!["ns", "pod1", "1/1", "11s"])]);

        let event = table.row_events().get("ns/pod1").unwrap();
        assert_eq!(event.kind, ResEvent::Update);
        assert_eq!(event.deltas.as_slice(), ["", "", "0/1", ""]);
        assert_eq!(event.row.fields[3], "11s");

        table.update(vec![Row::with_fields("ns/pod1", vec!["ns", "pod1", "1/1", "12s"])]);
        let event = table.row_events().get("ns/pod1").unwrap();
        assert_eq!(event.kind, ResEvent::Unchanged);
        assert_eq!(event.row.fields[3], "12s");
    }

    #[test]
    fn stale_rows_are_removed() {
        let mut table = table(vec![
            row("ns", "a", "1/1", "", "1m"),
            row("ns", "b", "1/1", "", "1m"),
            row("ns", "c", "1/1", "", "1m"),
        ]);
        table.update(vec![row("ns", "b", "1/1", "", "1m"), row("ns", "d", "1/1", "", "1m")]);
        assert_eq!(ids(&table), vec!["ns/b", "ns/d"]);
        assert_eq!(table.row_events().get("ns/d").unwrap().kind, ResEvent::Add);
        assert!(table.row_events().get("ns/a").is_none());
    }

    #[test]
    fn duplicate_ids_collapse() {
        let table = table(vec![row("ns", "a", "0/1", "", "1m"), row("ns", "a", "1/1", "", "1m")]);
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.row_events().get("ns/a").unwrap().row.fields[2], "1/1");
    }

    #[test]
    fn clear_reset_and_delete() {
        let mut table = table(vec![row("ns", "a", "1/1", "", "1m"), row("ns", "b", "1/1", "", "1m")]);
        table.delete("ns/a");
        table.delete("ns/zorg");
        assert_eq!(ids(&table), vec!["ns/b"]);

        table.clear();
        assert!(table.is_empty());
        assert!(table.header().is_empty());

        table.reset("kube-system");
        assert_eq!(table.namespace(), "kube-system");
    }

    #[test]
    fn diff_ignores_age_only_changes() {
        let left = table(vec![row("ns", "a", "1/1", "", "1m")]);
        let mut right = left.clone();
        assert!(!left.diff(&right));

        right.update(vec![row("ns", "a", "1/1", "", "2m")]);
        assert!(left.diff(&right));
        let settled = right.clone();
        right.update(vec![row("ns", "a", "1/1", "", "3m")]);
        assert!(!settled.diff(&right));

        right.reset("other");
        assert!(left.diff(&right));
    }

    #[test]
    fn filters() {
        let table = table(vec![
            row("ns", "nginx-1", "1/1", "", "1m"),
            row("ns", "redis-1", "0/1", "container ready check failed: 0 of 1", "1m"),
            row("ns", "postgres", "1/1", "", "1m"),
        ]);

        let regex = FilterOpts { query: "NGINX|redis".into(), ..FilterOpts::default() };
        assert_eq!(ids(&table.filter(&regex)), vec!["ns/nginx-1", "ns/redis-1"]);

        let inverse = FilterOpts { query: "!-1$".into(), ..FilterOpts::default() };
        assert_eq!(ids(&table.filter(&inverse)), vec!["ns/postgres"]);

        let fuzzy = FilterOpts { query: "-f pgs".into(), ..FilterOpts::default() };
        assert_eq!(ids(&table.filter(&fuzzy)), vec!["ns/postgres"]);

        let toast = FilterOpts { toast: true, ..FilterOpts::default() };
        assert_eq!(ids(&table.filter(&toast)), vec!["ns/redis-1"]);

        let broken = FilterOpts { query: "(".into(), ..FilterOpts::default() };
        assert_eq!(table.filter(&broken).row_count(), 3);
        assert!(FilterOpts::default().is_empty());
    }

    #[test]
    fn age_column_is_not_searched() {
        let table = table(vec![row("ns", "a", "1/1", "", "5m"), row("ns", "b", "1/1", "", "1h")]);
        let opts = FilterOpts { query: "5m".into(), ..FilterOpts::default() };
        assert!(table.filter(&opts).is_empty());
    }

    #[test]
    fn sorting_and_default_column() {
        let mut table = table(vec![
            row("b", "x", "1/1", "", "10m10s"),
            row("a", "y", "1/1", "", "19s"),
            row("a", "x", "1/1", "", "2m"),
        ]);
        assert_eq!(table.default_sort_column(None), SortColumn::new("NAMESPACE", true));

        table.sort(&SortColumn::new("AGE", true));
        assert_eq!(ids(&table), vec!["a/y", "a/x", "b/x"]);

        table.sort(&SortColumn::new("NAME", false));
        assert_eq!(ids(&table), vec!["a/y", "b/x", "a/x"]);

        let configured = SortColumn::new("AGE", false);
        assert_eq!(table.default_sort_column(Some(&configured)), configured);
        let unknown = SortColumn::new("ZORG", true);
        assert_eq!(table.default_sort_column(Some(&unknown)).name, "NAMESPACE");

        let mut scoped = TableData::new("a");
        scoped.set_header(header());
        assert_eq!(scoped.default_sort_column(None).name, "NAME");
    }

    #[test]
    fn customize_projects_columns() {
        let table = table(vec![row("ns", "a", "1/1", "", "1m")]);
        let custom = table.customize(&["NAME", "ZORG"], false);
        assert_eq!(custom.header().column_names(true), vec!["NAME", "ZORG"]);
        let event = custom.row_events().get("ns/a").unwrap();
        assert_eq!(event.row.fields, vec!["a", NA_VALUE]);
        assert_eq!(table.header().len(), 5);

        let wide = table.customize(&["NAME"], true);
        assert_eq!(
            wide.header().column_names(true),
            vec!["NAME", "NAMESPACE", "READY", "VALID", "AGE"]
        );
    }

    #[test]
    fn labelize_turns_label_keys_into_columns() {
        let mut table = TableData::new("all");
        table.set_header(Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("AGE").time(),
        ]));
        table.update(vec![
            Row::with_fields("ns/web", vec!["ns", "web", "app=web,tier=front", "1m"]),
            Row::with_fields("ns/db", vec!["ns", "db", "app=db", "1m"]),
        ]);
        table.update(vec![
            Row::with_fields("ns/web", vec!["ns", "web", "app=web,tier=back", "2m"]),
            Row::with_fields("ns/db", vec!["ns", "db", "app=db", "2m"]),
        ]);

        let labelized = table.labelize(&["tier", "app"]);
        assert_eq!(
            labelized.header().column_names(false),
            vec!["NAMESPACE", "NAME", "tier", "app"]
        );
        let web = labelized.row_events().get("ns/web").unwrap();
        assert_eq!(web.row.fields, vec!["ns", "web", "back", "web"]);
        assert_eq!(web.deltas.as_slice(), ["", "", "front", ""]);
        let db = labelized.row_events().get("ns/db").unwrap();
        assert_eq!(db.row.fields, vec!["ns", "db", "", "db"]);
        assert_eq!(table.header().len(), 4);

        let mut scoped = table.clone();
        scoped.reset("ns");
        scoped.set_header(table.header().clone());
        scoped.update(vec![Row::with_fields("ns/web", vec!["ns", "web", "app=web", "1m"])]);
        assert_eq!(
            scoped.labelize(&["app"]).header().column_names(false),
            vec!["NAME", "app"]
        );

        let mut unlabeled = TableData::new("all");
        unlabeled.set_header(header());
        assert_eq!(unlabeled.labelize(&["app"]).header().len(), 5);
    }

    #[test]
    fn reconcile_with_custom_columns() {
        let objects = vec![json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "fred", "namespace": "ns1"}
        })];
        let specs = ColumnSpecs::parse(&["NAMESPACE", "BLEE:.metadata.name"]).unwrap();
        let mut table = TableData::new("all");
        table.reconcile(&Generic, &specs, &objects).unwrap();

        let header = table.header();
        assert_eq!(
            header.column_names(true),
            vec!["NAMESPACE", "BLEE", "NAME", "LABELS", "VALID", "AGE"]
        );
        assert!(header.iter().skip(2).all(|column| column.wide));
        let event = table.row_events().get("ns1/fred").unwrap();
        assert_eq!(event.row.fields[..3], ["ns1", "fred", "fred"]);
        assert_eq!(event.kind, ResEvent::Add);

        table.reconcile(&Generic, &specs, &objects).unwrap();
        assert_eq!(
            table.row_events().get("ns1/fred").unwrap().kind,
            ResEvent::Unchanged
        );
    }

    #[test]
    fn reconcile_skips_foreign_objects() {
        let objects = vec![
            json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "svc"}}),
        ];
        let mut table = TableData::new("default");
        table
            .reconcile(&PodRenderer, &ColumnSpecs::default(), &objects)
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.header().len(), PodRenderer.header("default").len());
    }

    #[test]
    fn shared_table_snapshots() {
        let shared = SharedTable::new(TableData::new("all"));
        shared.write().set_header(header());
        shared.write().update(vec![row("ns", "a", "1/1", "", "1m")]);
        let snapshot = shared.snapshot();
        shared.write().clear();
        assert_eq!(snapshot.row_count(), 1);
        assert!(shared.read().is_empty());
    }
}
