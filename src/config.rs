use crate::kind::KindDef;
use crate::query::ColumnSpecs;
use crate::render::Theme;
use crate::sort::SortColumn;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct RuntimeConfigSnapshot {
    pub source: Option<String>,
    pub theme: Theme,
    /// Keyed by `group/version/resource`.
    pub views: HashMap<String, ViewConfig>,
}

impl Default for RuntimeConfigSnapshot {
    fn default() -> Self {
        Self {
            source: None,
            theme: Theme::default(),
            views: HashMap::new(),
        }
    }
}

impl RuntimeConfigSnapshot {
    pub fn view(&self, gvr: &str) -> Option<&ViewConfig> {
        self.views.get(gvr)
    }
}

/// Operator overrides for one resource view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewConfig {
    pub columns: ColumnSpecs,
    pub sort_column: Option<SortColumn>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfigWatcher {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KubetabConfigFile {
    #[serde(default)]
    theme: ThemeConfig,
    #[serde(default)]
    views: BTreeMap<String, ViewSpec>,
}

/// Color overrides as written in the config file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ThemeConfig {
    pub add: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
    pub error: Option<String>,
    pub std: Option<String>,
    pub pending: Option<String>,
    pub highlight: Option<String>,
    pub completed: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ViewSpec {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default, rename = "sortColumn", alias = "sort_column")]
    sort_column: Option<String>,
}

impl RuntimeConfigWatcher {
    pub fn discover() -> Self {
        Self {
            path: discover_config_path(),
            modified: None,
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            modified: None,
        }
    }

    pub fn load_current(&mut self) -> Result<RuntimeConfigSnapshot> {
        let Some(path) = self.path.clone() else {
            return Ok(RuntimeConfigSnapshot::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read runtime config {}", path.display()))?;
        let parsed: KubetabConfigFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse runtime config {}", path.display()))?;
        self.modified = fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());

        let theme = Theme::from_config(&parsed.theme)
            .with_context(|| format!("invalid theme in {}", path.display()))?;
        let mut views = HashMap::with_capacity(parsed.views.len());
        for (key, spec) in parsed.views {
            let view = build_view(&key, &spec)
                .with_context(|| format!("invalid view {key:?} in {}", path.display()))?;
            let Some(kind) = KindDef::parse(&key) else {
                anyhow::bail!("unknown resource {key:?} in {}", path.display());
            };
            views.insert(kind.gvr(), view);
        }

        Ok(RuntimeConfigSnapshot {
            source: Some(path.display().to_string()),
            theme,
            views,
        })
    }

    pub fn reload_if_changed(&mut self) -> Result<Option<RuntimeConfigSnapshot>> {
        if self.path.is_none() {
            self.path = discover_config_path();
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(None);
        }

        let current_path = self.path.clone().unwrap_or_default();
        if !current_path.exists() {
            self.path = discover_config_path();
            self.modified = None;
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(Some(RuntimeConfigSnapshot::default()));
        }

        let modified = fs::metadata(&current_path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        if modified != self.modified {
            return self.load_current().map(Some);
        }

        Ok(None)
    }
}

fn build_view(key: &str, spec: &ViewSpec) -> Result<ViewConfig> {
    let columns = ColumnSpecs::parse(&spec.columns)
        .with_context(|| format!("invalid columns for {key}"))?;
    let sort_column = spec
        .sort_column
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<SortColumn>)
        .transpose()
        .with_context(|| format!("invalid sort column for {key}"))?;

    Ok(ViewConfig {
        columns,
        sort_column,
    })
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBETAB_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("kubetab.yaml"),
        PathBuf::from("kubetab.yml"),
        PathBuf::from(".kubetab.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/kubetab/config.yaml"),
            PathBuf::from(&home).join(".config/kubetab/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::RuntimeConfigWatcher;
    use crate::model::Align;
    use crate::render::Theme;
    use ratatui::style::Color;
    use std::fs;

    const CONFIG: &str = r##"
theme:
  add: red
  completed: "#102030"
views:
  po:
    columns: ["NAMESPACE", "NAME", "IP:.status.podIP|WR"]
    sortColumn: "NAME:desc"
  apps/v1/deployments:
    sort_column: AGE
"##;

    #[test]
    fn loads_views_and_theme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubetab.yaml");
        fs::write(&path, CONFIG).unwrap();

        let mut watcher = RuntimeConfigWatcher::with_path(&path);
        let snapshot = watcher.load_current().unwrap();
        assert_eq!(snapshot.source, Some(path.display().to_string()));
        assert_eq!(snapshot.theme.add, Color::Red);
        assert_eq!(snapshot.theme.completed, Color::Rgb(0x10, 0x20, 0x30));
        assert_eq!(snapshot.theme.update, Theme::default().update);

        let pods = snapshot.view("v1/pods").unwrap();
        assert_eq!(pods.columns.len(), 3);
        let ip = pods.columns.iter().nth(2).unwrap();
        assert_eq!(ip.name(), "IP");
        assert!(ip.header.wide);
        assert_eq!(ip.header.align, Align::Right);
        let sort = pods.sort_column.as_ref().unwrap();
        assert_eq!((sort.name.as_str(), sort.asc), ("NAME", false));

        let deployments = snapshot.view("apps/v1/deployments").unwrap();
        assert!(deployments.columns.is_empty());
        assert_eq!(deployments.sort_column.as_ref().unwrap().name, "AGE");
    }

    #[test]
    fn bad_column_spec_names_the_view() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubetab.yaml");
        fs::write(&path, "views:\n  svc:\n    columns: [\"\"]\n").unwrap();

        let error = RuntimeConfigWatcher::with_path(&path)
            .load_current()
            .unwrap_err();
        assert!(format!("{error:#}").contains("invalid view \"svc\""));
    }

    #[test]
    fn bad_theme_color_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubetab.yaml");
        fs::write(&path, "theme:\n  error: not-a-color\n").unwrap();

        let error = RuntimeConfigWatcher::with_path(&path)
            .load_current()
            .unwrap_err();
        assert!(format!("{error:#}").contains("invalid theme color for error"));
    }

    #[test]
    fn unknown_view_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubetab.yaml");
        fs::write(&path, "views:\n  nonsense:\n    columns: [NAME]\n").unwrap();

        assert!(RuntimeConfigWatcher::with_path(&path).load_current().is_err());
    }

    #[test]
    fn reload_only_when_modified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubetab.yaml");
        fs::write(&path, CONFIG).unwrap();

        let mut watcher = RuntimeConfigWatcher::with_path(&path);
        watcher.load_current().unwrap();
        assert!(watcher.reload_if_changed().unwrap().is_none());
    }
}
