use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use kubetab::app::{App, ViewOptions};
use kubetab::cli::CliArgs;
use kubetab::config::{RuntimeConfigSnapshot, RuntimeConfigWatcher};
use kubetab::input;
use kubetab::k8s::KubeGateway;
use kubetab::kind::KindDef;
use kubetab::model::NamespaceScope;
use kubetab::render::RendererRegistry;
use kubetab::sort::SortColumn;
use kubetab::table::TableData;
use kubetab::ui;
use kubetab::watch::{SnapshotSource, TableWatcher, ViewSpec, WatchEvent, compact_error};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::File;
use std::io::{self, Stdout, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const ONCE_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIG_POLL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let mut config_watcher = RuntimeConfigWatcher::discover();
    let config = config_watcher.load_current()?;
    if let Some(source) = &config.source {
        info!("loaded runtime config from {source}");
    }

    let gateway = KubeGateway::new().await?;
    let kind = KindDef::parse(&args.kind)
        .with_context(|| format!("unknown resource {:?}", args.kind))?;
    let kind = gateway.resolve(kind).await?;
    let scope = resolve_namespace_scope(&args, &gateway);
    if args.all_namespaces && args.namespace.is_some() {
        warn!("both --all-namespaces and --namespace were provided, using all namespaces");
    }

    let sort = args
        .sort
        .as_deref()
        .map(str::parse::<SortColumn>)
        .transpose()
        .context("invalid --sort")?;
    let registry = RendererRegistry::default();
    let view = view_spec(&registry, &config, kind, scope, args.refresh_ms());
    let options = ViewOptions {
        columns: args.columns.clone(),
        labels: args.labels.clone(),
        wide: args.wide,
        sort: sort.or_else(|| configured_sort(&config, &view.kind)),
    };

    if args.once {
        return print_once(&gateway, &view, &options).await;
    }

    let mut app = App::new(
        gateway.cluster().to_string(),
        gateway.context().to_string(),
        view.kind.clone(),
        view.scope.clone(),
        config.theme,
        view.renderer.colorer(),
        options,
    );
    run(&mut app, Arc::new(gateway), view, config_watcher).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(io::sink).try_init();
        }
    }

    Ok(())
}

fn resolve_namespace_scope(args: &CliArgs, gateway: &KubeGateway) -> NamespaceScope {
    if args.all_namespaces {
        NamespaceScope::All
    } else if let Some(namespace) = &args.namespace {
        NamespaceScope::Named(namespace.clone())
    } else {
        NamespaceScope::Named(gateway.default_namespace().to_string())
    }
}

fn view_spec(
    registry: &RendererRegistry,
    config: &RuntimeConfigSnapshot,
    kind: KindDef,
    scope: NamespaceScope,
    refresh_ms: u64,
) -> ViewSpec {
    let gvr = kind.gvr();
    ViewSpec {
        renderer: registry.lookup(&gvr),
        columns: config
            .view(&gvr)
            .map(|view| view.columns.clone())
            .unwrap_or_default(),
        kind,
        scope,
        refresh: Duration::from_millis(refresh_ms),
    }
}

fn configured_sort(config: &RuntimeConfigSnapshot, kind: &KindDef) -> Option<SortColumn> {
    config
        .view(&kind.gvr())
        .and_then(|view| view.sort_column.clone())
}

async fn print_once(gateway: &KubeGateway, view: &ViewSpec, options: &ViewOptions) -> Result<()> {
    let objects = timeout(ONCE_TIMEOUT, gateway.snapshot(&view.kind, &view.scope))
        .await
        .with_context(|| format!("listing {} timed out", view.kind.gvr()))??;

    let mut table = TableData::new(view.table_namespace());
    table.reconcile(view.renderer.as_ref(), &view.columns, &objects)?;
    let mut table = if options.labels.is_empty() {
        table.customize(&options.columns, options.wide)
    } else {
        table.labelize(&options.labels)
    };
    let column = table.default_sort_column(options.sort.as_ref());
    table.sort(&column);

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(ui::render_text(&table, options.wide).as_bytes())
        .context("failed to write table")?;
    Ok(())
}

async fn run(
    app: &mut App,
    gateway: Arc<KubeGateway>,
    view: ViewSpec,
    config_watcher: RuntimeConfigWatcher,
) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, gateway, view, config_watcher).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    gateway: Arc<KubeGateway>,
    mut view: ViewSpec,
    mut config_watcher: RuntimeConfigWatcher,
) -> Result<()> {
    let mut reader = EventStream::new();
    let mut config_ticker = interval(CONFIG_POLL);
    config_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<WatchEvent>();
    let mut watcher = TableWatcher::spawn(Arc::clone(&gateway), view.clone(), watch_tx.clone());

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            app.apply_action(action);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_event = watch_rx.recv() => {
                match maybe_event {
                    Some(WatchEvent::Updated(_)) => app.set_table(watcher.table().snapshot()),
                    Some(WatchEvent::Failed { gvr, error }) => {
                        app.set_status(format!("Refresh failed for {gvr}: {error}"));
                    }
                    None => break,
                }
            }
            _ = config_ticker.tick() => {
                match config_watcher.reload_if_changed() {
                    Ok(Some(config)) => {
                        app.set_theme(config.theme);
                        let columns = config
                            .view(&view.kind.gvr())
                            .map(|view| view.columns.clone())
                            .unwrap_or_default();
                        if columns != view.columns {
                            info!("columns for {} changed, restarting watcher", view.kind.gvr());
                            watcher.stop().await;
                            view = ViewSpec { columns, ..view };
                            watcher = TableWatcher::spawn(
                                Arc::clone(&gateway),
                                view.clone(),
                                watch_tx.clone(),
                            );
                        }
                        app.set_status("Runtime config reloaded");
                    }
                    Ok(None) => {}
                    Err(error) => {
                        app.set_status(format!("Config reload failed: {}", compact_error(&error)));
                    }
                }
            }
        }
    }

    watcher.stop().await;
    Ok(())
}
