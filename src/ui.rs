use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::app::{App, InputMode};
use crate::model::{Align, Header};
use crate::table::TableData;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const SORT_ASC: &str = "↑";
const SORT_DESC: &str = "↓";

pub fn render(frame: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    app.set_table_page_size(table_rows_visible(root[1]));
    render_header(frame, root[0], app);
    render_table(frame, root[1], app);
    render_footer(frame, root[2], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", app.context()),
            Style::default().fg(Color::White).bg(PL_A),
        ),
        Span::styled(
            format!(" {} ", app.cluster()),
            Style::default().fg(Color::White).bg(PL_B),
        ),
        Span::styled(
            format!(" {} ", app.namespace_scope()),
            Style::default().fg(Color::Black).bg(ACCENT),
        ),
    ];
    if let Some(stamp) = app.last_refresh() {
        spans.push(Span::styled(
            format!(" {stamp} "),
            Style::default().fg(MUTED),
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let view = app.view();
    let header = view.header();
    let visible = app.visible_columns();
    let sort = app.sort_column();

    let header_row = Row::new(visible.iter().map(|index| {
        let column = &header[*index];
        let mut label = column.name.clone();
        if column.name == sort.name {
            label.push_str(if sort.asc { SORT_ASC } else { SORT_DESC });
        }
        Cell::from(label).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = view.row_events().iter().map(|event| {
        let color = app.row_color(event);
        Row::new(visible.iter().map(|index| {
            let column = &header[*index];
            let value = event
                .row
                .fields
                .get(*index)
                .map(|value| column.decorate(value))
                .unwrap_or_default();
            let line = Line::from(value);
            Cell::from(match column.align {
                Align::Left => line,
                Align::Right => line.alignment(Alignment::Right),
            })
        }))
        .style(Style::default().fg(color))
    });

    let constraints = column_constraints(header, &visible, view);
    let mut title = format!(" {}({}) [{}] ", app.kind().title(), view.row_count(), view.namespace());
    if !app.filter().is_empty() {
        title.push_str(&format!("</{}> ", app.filter()));
    }
    if app.toast() {
        title.push_str("<toast> ");
    }
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(MUTED))
        .style(Style::default().bg(PANEL));

    let table = Table::new(rows, constraints)
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .fg(app.theme().highlight)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        );

    let mut state = TableState::default();
    state.select(app.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let line = match app.mode() {
        InputMode::Filter => Line::from(vec![
            Span::styled(" / ", Style::default().fg(Color::Black).bg(ACCENT)),
            Span::raw(format!(" {}", app.input())),
        ]),
        InputMode::Normal => Line::from(vec![
            Span::styled(" kubetab ", Style::default().fg(Color::White).bg(PL_A)),
            Span::raw(format!(" {} ", app.status())),
            Span::styled(
                " q quit  / filter  w wide  N/A sort  </> column  ^z toast",
                Style::default().fg(MUTED),
            ),
        ]),
    };
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
}

fn table_rows_visible(area: Rect) -> usize {
    area.height.saturating_sub(3).max(1) as usize
}

/// Column widths from the longest of header name and values.
fn column_widths(header: &Header, visible: &[usize], table: &TableData) -> Vec<usize> {
    visible
        .iter()
        .map(|index| {
            let column = &header[*index];
            table
                .row_events()
                .iter()
                .filter_map(|event| event.row.fields.get(*index))
                .map(|value| column.decorate(value).chars().count())
                .fold(column.name.chars().count() + 1, usize::max)
        })
        .collect()
}

fn column_constraints(header: &Header, visible: &[usize], table: &TableData) -> Vec<Constraint> {
    if visible.is_empty() {
        return vec![Constraint::Percentage(100)];
    }

    column_widths(header, visible, table)
        .into_iter()
        .map(|width| Constraint::Length(width as u16))
        .collect()
}

fn align_cell(value: &str, align: Align, width: usize) -> String {
    match align {
        Align::Left => format!("{value:<width$}"),
        Align::Right => format!("{value:>width$}"),
    }
}

/// Plain-text rendition of a table, visible columns only, space aligned.
pub fn render_text(table: &TableData, wide: bool) -> String {
    let header = table.header();
    let visible = header.visible_indices(table.namespace(), wide);
    let widths = column_widths(header, &visible, table);

    let mut lines = Vec::with_capacity(table.row_count() + 1);
    let names = visible
        .iter()
        .zip(&widths)
        .map(|(index, width)| align_cell(&header[*index].name, header[*index].align, *width))
        .collect::<Vec<_>>();
    lines.push(names.join(" ").trim_end().to_string());

    for event in table.row_events().iter() {
        let cells = visible
            .iter()
            .zip(&widths)
            .map(|(index, width)| {
                let column = &header[*index];
                let value = event
                    .row
                    .fields
                    .get(*index)
                    .map(|value| column.decorate(value))
                    .unwrap_or_default();
                align_cell(&value, column.align, *width)
            })
            .collect::<Vec<_>>();
        lines.push(cells.join(" ").trim_end().to_string());
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
