use crate::input::Action;
use crate::kind::KindDef;
use crate::model::{NamespaceScope, RowEvent};
use crate::render::{ColorerFunc, Theme};
use crate::sort::SortColumn;
use crate::table::{FilterOpts, TableData};
use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Filter,
}

/// Startup choices for the single table view.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub columns: Vec<String>,
    /// Label keys shown as columns in place of the regular ones.
    pub labels: Vec<String>,
    pub wide: bool,
    pub sort: Option<SortColumn>,
}

/// Front-end state. Holds the latest table snapshot and the view derived
/// from it; never writes back into the table.
pub struct App {
    running: bool,
    mode: InputMode,
    kind: KindDef,
    namespace_scope: NamespaceScope,
    cluster: String,
    context: String,
    theme: Theme,
    colorer: ColorerFunc,
    columns: Vec<String>,
    labels: Vec<String>,
    wide: bool,
    toast: bool,
    filter: String,
    input: String,
    status: String,
    configured_sort: Option<SortColumn>,
    sort: SortColumn,
    source: TableData,
    view: TableData,
    selected: usize,
    table_page_size: usize,
    last_refresh: Option<DateTime<Local>>,
}

impl App {
    pub fn new(
        cluster: String,
        context: String,
        kind: KindDef,
        namespace_scope: NamespaceScope,
        theme: Theme,
        colorer: ColorerFunc,
        options: ViewOptions,
    ) -> Self {
        Self {
            running: true,
            mode: InputMode::Normal,
            kind,
            namespace_scope,
            cluster,
            context,
            theme,
            colorer,
            columns: options.columns,
            labels: options.labels,
            wide: options.wide,
            toast: false,
            filter: String::new(),
            input: String::new(),
            status: "Loading…".to_string(),
            configured_sort: options.sort,
            sort: SortColumn::default(),
            source: TableData::default(),
            view: TableData::default(),
            selected: 0,
            table_page_size: 10,
            last_refresh: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn kind(&self) -> &KindDef {
        &self.kind
    }

    pub fn namespace_scope(&self) -> &NamespaceScope {
        &self.namespace_scope
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn wide(&self) -> bool {
        self.wide
    }

    pub fn toast(&self) -> bool {
        self.toast
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn sort_column(&self) -> &SortColumn {
        &self.sort
    }

    pub fn view(&self) -> &TableData {
        &self.view
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.view.is_empty()).then_some(self.selected)
    }

    pub fn selected_row(&self) -> Option<&RowEvent> {
        self.view.row_events().at(self.selected)
    }

    pub fn last_refresh(&self) -> Option<String> {
        self.last_refresh
            .map(|stamp| stamp.format("%H:%M:%S").to_string())
    }

    pub fn set_table_page_size(&mut self, rows: usize) {
        self.table_page_size = rows.max(1);
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Colors one row of the current view.
    pub fn row_color(&self, event: &RowEvent) -> ratatui::style::Color {
        (self.colorer)(&self.theme, self.view.namespace(), self.view.header(), event)
    }

    /// Indices of the view columns to paint.
    pub fn visible_columns(&self) -> Vec<usize> {
        self.view
            .header()
            .visible_indices(self.view.namespace(), self.wide)
    }

    pub fn set_table(&mut self, table: TableData) {
        self.source = table;
        self.last_refresh = Some(Local::now());
        self.status = format!("{} {}", self.source.row_count(), self.kind.title());
        self.rebuild_view();
    }

    fn rebuild_view(&mut self) {
        let selected_id = self.selected_row().map(|event| event.row.id.clone());
        let opts = FilterOpts {
            toast: self.toast,
            query: self.filter.clone(),
        };
        let projected = if self.labels.is_empty() {
            self.source.customize(&self.columns, self.wide)
        } else {
            self.source.labelize(&self.labels)
        };
        let mut view = projected.filter(&opts);
        let configured = if self.sort.is_blank() {
            self.configured_sort.as_ref()
        } else {
            Some(&self.sort)
        };
        self.sort = view.default_sort_column(configured);
        view.sort(&self.sort);

        self.selected = selected_id
            .and_then(|id| view.row_events().find_index(&id))
            .unwrap_or(self.selected)
            .min(view.row_count().saturating_sub(1));
        self.view = view;
    }

    pub fn apply_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
            }
            Action::Down => self.move_selection(1),
            Action::Up => self.move_selection(-1),
            Action::PageDown => self.move_selection(self.table_page_size as isize),
            Action::PageUp => self.move_selection(-(self.table_page_size as isize)),
            Action::Top => self.selected = 0,
            Action::Bottom => self.selected = self.view.row_count().saturating_sub(1),
            Action::ToggleWide => {
                self.wide = !self.wide;
                self.status = if self.wide { "Wide on" } else { "Wide off" }.to_string();
                self.rebuild_view();
            }
            Action::ToggleToast => {
                self.toast = !self.toast;
                self.status = if self.toast {
                    "Showing unhealthy only"
                } else {
                    "Showing all"
                }
                .to_string();
                self.rebuild_view();
            }
            Action::StartFilter => {
                self.mode = InputMode::Filter;
                self.input = self.filter.clone();
                self.status = "Filter mode".to_string();
            }
            Action::ClearFilter => {
                if !self.filter.is_empty() {
                    self.filter.clear();
                    self.status = "Filter cleared".to_string();
                    self.rebuild_view();
                }
            }
            Action::SortBy(name) => self.sort_by(name),
            Action::SortNext => self.sort_by_offset(1),
            Action::SortPrev => self.sort_by_offset(-1),
            Action::SubmitInput => {
                self.mode = InputMode::Normal;
                self.filter = self.input.trim().to_string();
                self.input.clear();
                self.status = if self.filter.is_empty() {
                    "Filter cleared".to_string()
                } else {
                    format!("Filter: {}", self.filter)
                };
                self.rebuild_view();
            }
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.input.clear();
                self.status = "Input cancelled".to_string();
            }
            Action::Backspace => {
                self.input.pop();
            }
            Action::InputChar(c) => self.input.push(c),
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.view.row_count();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    /// Selecting the active sort column again flips its order.
    fn sort_by(&mut self, name: &str) {
        if self.view.header().index_of(name, true).is_none() {
            self.status = format!("No {name} column to sort on");
            return;
        }
        self.sort = if self.sort.name == name {
            SortColumn::new(name, !self.sort.asc)
        } else {
            SortColumn::new(name, true)
        };
        self.status = format!(
            "Sorted by {name} {}",
            if self.sort.asc { "asc" } else { "desc" }
        );
        self.rebuild_view();
    }

    fn sort_by_offset(&mut self, offset: isize) {
        let header = self.view.header();
        let visible = self.visible_columns();
        if visible.is_empty() {
            return;
        }
        let current = visible
            .iter()
            .position(|index| header[*index].name == self.sort.name)
            .unwrap_or(0);
        let next = (current as isize + offset).rem_euclid(visible.len() as isize) as usize;
        let name = header[visible[next]].name.clone();
        self.sort = SortColumn::new(name, self.sort.asc);
        self.status = format!("Sorted by {}", self.sort.name);
        self.rebuild_view();
    }
}

#[cfg(test)]
mod tests {
    use super::{App, InputMode, ViewOptions};
    use crate::input::Action;
    use crate::kind::ResourceKind;
    use crate::model::{Header, HeaderColumn, NamespaceScope, Row};
    use crate::render::{Theme, default_colorer};
    use crate::sort::SortColumn;
    use crate::table::TableData;

    fn table() -> TableData {
        let mut table = TableData::new("all");
        table.set_header(Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("RESTARTS").right(),
            HeaderColumn::new("IP").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ]));
        table.update(vec![
            Row::with_fields("ns1/web", vec!["ns1", "web", "10", "10.0.0.1", "", "5m"]),
            Row::with_fields("ns2/api", vec!["ns2", "api", "2", "10.0.0.2", "bad", "1h"]),
            Row::with_fields("ns1/db", vec!["ns1", "db", "1", "10.0.0.3", "", "30s"]),
        ]);
        table
    }

    fn app(options: ViewOptions) -> App {
        let mut app = App::new(
            "https://cluster".to_string(),
            "kind-dev".to_string(),
            ResourceKind::Pods.def(),
            NamespaceScope::All,
            Theme::default(),
            default_colorer,
            options,
        );
        app.set_table(table());
        app
    }

    fn names(app: &App) -> Vec<String> {
        let index = app.view().header().index_of("NAME", true).unwrap();
        app.view()
            .row_events()
            .iter()
            .map(|event| event.row.fields[index].clone())
            .collect()
    }

    #[test]
    fn defaults_to_namespace_sort_in_all_namespaces() {
        let app = app(ViewOptions::default());
        assert_eq!(app.sort_column(), &SortColumn::new("NAMESPACE", true));
        assert_eq!(names(&app), ["db", "web", "api"]);
        assert_eq!(app.visible_columns(), [0, 1, 2, 5]);
    }

    #[test]
    fn configured_sort_is_honored() {
        let app = app(ViewOptions {
            sort: Some(SortColumn::new("RESTARTS", false)),
            ..ViewOptions::default()
        });
        assert_eq!(names(&app), ["web", "api", "db"]);
    }

    #[test]
    fn same_sort_key_flips_order() {
        let mut app = app(ViewOptions::default());
        app.apply_action(Action::SortBy("AGE"));
        assert_eq!(names(&app), ["db", "web", "api"]);
        app.apply_action(Action::SortBy("AGE"));
        assert_eq!(names(&app), ["api", "web", "db"]);
        app.apply_action(Action::SortBy("STATUS"));
        assert_eq!(app.status(), "No STATUS column to sort on");
    }

    #[test]
    fn filter_keeps_selection_on_same_row() {
        let mut app = app(ViewOptions::default());
        app.apply_action(Action::Down);
        assert_eq!(app.selected_row().unwrap().row.id, "ns1/web");

        app.apply_action(Action::StartFilter);
        assert_eq!(app.mode(), InputMode::Filter);
        for c in "we".chars() {
            app.apply_action(Action::InputChar(c));
        }
        app.apply_action(Action::SubmitInput);
        assert_eq!(app.filter(), "we");
        assert_eq!(names(&app), ["web"]);
        assert_eq!(app.selected_row().unwrap().row.id, "ns1/web");

        app.apply_action(Action::ClearFilter);
        assert_eq!(app.view().row_count(), 3);
        assert_eq!(app.selected_row().unwrap().row.id, "ns1/web");
    }

    #[test]
    fn toast_and_wide_toggles() {
        let mut app = app(ViewOptions::default());
        app.apply_action(Action::ToggleToast);
        assert_eq!(names(&app), ["api"]);
        assert_eq!(app.row_color(app.selected_row().unwrap()), app.theme().error);

        app.apply_action(Action::ToggleWide);
        assert_eq!(app.visible_columns(), [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn column_pick_list_customizes_view() {
        let app = app(ViewOptions {
            columns: vec!["NAME".to_string(), "IP".to_string()],
            ..ViewOptions::default()
        });
        let header = app.view().header();
        assert_eq!(header.column_names(true), ["NAME", "IP"]);
        assert_eq!(app.sort_column().name, "NAME");
        assert_eq!(names(&app), ["api", "db", "web"]);
    }

    #[test]
    fn label_keys_replace_regular_columns() {
        let mut app = app(ViewOptions {
            labels: vec!["tier".to_string()],
            ..ViewOptions::default()
        });
        let mut labeled = TableData::new("all");
        labeled.set_header(Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("LABELS").wide(),
        ]));
        labeled.update(vec![
            Row::with_fields("ns1/web", vec!["ns1", "web", "tier=front"]),
            Row::with_fields("ns1/db", vec!["ns1", "db", "tier=back"]),
        ]);
        app.set_table(labeled);

        assert_eq!(app.view().header().column_names(false), ["NAMESPACE", "NAME", "tier"]);
        assert_eq!(names(&app), ["db", "web"]);
        app.apply_action(Action::SortBy("tier"));
        assert_eq!(names(&app), ["db", "web"]);
        app.apply_action(Action::SortBy("tier"));
        assert_eq!(names(&app), ["web", "db"]);
    }

    #[test]
    fn selection_is_clamped() {
        let mut app = app(ViewOptions::default());
        app.apply_action(Action::PageUp);
        assert_eq!(app.selected_index(), Some(0));
        app.apply_action(Action::Bottom);
        assert_eq!(app.selected_index(), Some(2));
        app.apply_action(Action::Down);
        assert_eq!(app.selected_index(), Some(2));
        app.apply_action(Action::Quit);
        assert!(!app.running());
    }
}
