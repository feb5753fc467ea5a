use crate::config::ThemeConfig;
use crate::model::{Header, ResEvent, Row, RowEvent};
use anyhow::{Context, Result};
use ratatui::style::Color;
use std::str::FromStr;

/// Row colors handed to every colorer. Built once at startup from the
/// runtime configuration and passed down explicitly.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Theme {
    pub add: Color,
    pub update: Color,
    pub delete: Color,
    pub error: Color,
    pub std: Color,
    pub pending: Color,
    pub highlight: Color,
    pub completed: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            add: Color::Rgb(30, 144, 255),
            update: Color::Rgb(173, 255, 47),
            delete: Color::Rgb(147, 112, 219),
            error: Color::Rgb(255, 69, 0),
            std: Color::Rgb(135, 206, 250),
            pending: Color::Rgb(255, 140, 0),
            highlight: Color::Rgb(0, 255, 255),
            completed: Color::Rgb(119, 136, 153),
        }
    }
}

impl Theme {
    pub fn from_config(config: &ThemeConfig) -> Result<Self> {
        let mut theme = Self::default();
        let slots = [
            ("add", &config.add, &mut theme.add),
            ("update", &config.update, &mut theme.update),
            ("delete", &config.delete, &mut theme.delete),
            ("error", &config.error, &mut theme.error),
            ("std", &config.std, &mut theme.std),
            ("pending", &config.pending, &mut theme.pending),
            ("highlight", &config.highlight, &mut theme.highlight),
            ("completed", &config.completed, &mut theme.completed),
        ];
        for (slot, raw, color) in slots {
            let Some(raw) = raw else {
                continue;
            };
            *color = parse_color(raw).with_context(|| format!("invalid theme color for {slot}"))?;
        }

        Ok(theme)
    }
}

/// Parses a terminal color name, index or `#rrggbb`, plus the handful of
/// X11 names the default palette is described with.
pub fn parse_color(raw: &str) -> Result<Color> {
    let name = raw.trim().to_ascii_lowercase();
    let named = match name.as_str() {
        "dodgerblue" => Some(Color::Rgb(30, 144, 255)),
        "greenyellow" => Some(Color::Rgb(173, 255, 47)),
        "mediumpurple" => Some(Color::Rgb(147, 112, 219)),
        "orangered" => Some(Color::Rgb(255, 69, 0)),
        "lightskyblue" => Some(Color::Rgb(135, 206, 250)),
        "darkorange" => Some(Color::Rgb(255, 140, 0)),
        "aqua" => Some(Color::Rgb(0, 255, 255)),
        "lightslategray" | "lightslategrey" => Some(Color::Rgb(119, 136, 153)),
        _ => None,
    };
    if let Some(color) = named {
        return Ok(color);
    }

    Color::from_str(&name).map_err(|_| anyhow::anyhow!("unknown color {raw:?}"))
}

/// Computes a row color from its content.
pub type ColorerFunc = fn(&Theme, &str, &Header, &RowEvent) -> Color;

pub fn default_colorer(theme: &Theme, ns: &str, header: &Header, event: &RowEvent) -> Color {
    if !is_valid(ns, header, &event.row) {
        return theme.error;
    }

    match event.kind {
        ResEvent::Add => theme.add,
        ResEvent::Update => theme.update,
        ResEvent::Delete => theme.delete,
        ResEvent::Unchanged | ResEvent::Clear => theme.std,
    }
}

/// A row is valid unless its VALID column carries a diagnostic.
pub fn is_valid(_ns: &str, header: &Header, row: &Row) -> bool {
    if row.is_empty() {
        return true;
    }
    let Some(index) = header.valid_col_index() else {
        return true;
    };

    row.fields
        .get(index)
        .is_none_or(|value| value.trim().is_empty())
}
