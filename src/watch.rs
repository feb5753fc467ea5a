use crate::k8s::KubeGateway;
use crate::kind::KindDef;
use crate::model::{CLUSTER_SCOPE, NamespaceScope};
use crate::query::ColumnSpecs;
use crate::render::Renderer;
use crate::table::{SharedTable, TableData};
use anyhow::Result;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tracing::{debug, warn};

const LIST_TIMEOUT: Duration = Duration::from_secs(4);
const WATCH_THROTTLE: Duration = Duration::from_millis(350);

/// Delivers complete object sets for a kind and scope.
pub trait SnapshotSource: Send + Sync + 'static {
    fn snapshot(
        &self,
        kind: &KindDef,
        scope: &NamespaceScope,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;

    /// Fires when the source knows the set changed. Sources without a
    /// change feed rely on the refresh interval alone.
    fn changes(&self, _kind: &KindDef, _scope: &NamespaceScope) -> BoxStream<'static, ()> {
        stream::pending().boxed()
    }
}

impl SnapshotSource for KubeGateway {
    async fn snapshot(&self, kind: &KindDef, scope: &NamespaceScope) -> Result<Vec<Value>> {
        self.list(kind, scope).await
    }

    fn changes(&self, kind: &KindDef, scope: &NamespaceScope) -> BoxStream<'static, ()> {
        KubeGateway::changes(self, kind, scope)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WatchEvent {
    Updated(String),
    Failed { gvr: String, error: String },
}

/// What one watcher keeps up to date.
#[derive(Clone)]
pub struct ViewSpec {
    pub kind: KindDef,
    pub scope: NamespaceScope,
    pub renderer: Arc<dyn Renderer>,
    pub columns: ColumnSpecs,
    pub refresh: Duration,
}

impl ViewSpec {
    /// Namespace the table renders with: cluster scoped kinds use `-`.
    pub fn table_namespace(&self) -> String {
        if self.kind.namespaced {
            self.scope.label()
        } else {
            CLUSTER_SCOPE.to_string()
        }
    }
}

/// One background task feeding one table.
pub struct TableWatcher {
    table: SharedTable,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TableWatcher {
    pub fn spawn<S: SnapshotSource>(
        source: Arc<S>,
        view: ViewSpec,
        notify: mpsc::UnboundedSender<WatchEvent>,
    ) -> Self {
        let table = SharedTable::new(TableData::new(view.table_namespace()));
        let (cancel, cancelled) = oneshot::channel();
        let handle = tokio::spawn(run(source, view, table.clone(), notify, cancelled));
        Self {
            table,
            cancel: Some(cancel),
            handle,
        }
    }

    pub fn table(&self) -> SharedTable {
        self.table.clone()
    }

    /// Stops the loop and waits for it. The table stays readable.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(error) = (&mut self.handle).await {
            warn!("watch task ended abnormally: {error}");
        }
    }
}

impl Drop for TableWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<S: SnapshotSource>(
    source: Arc<S>,
    view: ViewSpec,
    table: SharedTable,
    notify: mpsc::UnboundedSender<WatchEvent>,
    mut cancelled: oneshot::Receiver<()>,
) {
    let mut ticker = interval(view.refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut changes = source.changes(&view.kind, &view.scope);
    let mut last_trigger: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = &mut cancelled => break,
            _ = ticker.tick() => {}
            Some(()) = changes.next() => {
                if !should_process_watch_event(&mut last_trigger) {
                    continue;
                }
                debug!("watch triggered refresh of {}", view.kind.gvr());
            }
        }

        if let Err(error) = refresh(source.as_ref(), &view, &table, &notify).await {
            let gvr = view.kind.gvr();
            warn!("refresh of {gvr} failed: {error:#}");
            let failed = WatchEvent::Failed {
                gvr,
                error: compact_error(&error),
            };
            if notify.send(failed).is_err() {
                break;
            }
        }
    }
    debug!("watcher for {} in {} stopped", view.kind.gvr(), view.scope);
}

async fn refresh<S: SnapshotSource>(
    source: &S,
    view: &ViewSpec,
    table: &SharedTable,
    notify: &mpsc::UnboundedSender<WatchEvent>,
) -> Result<()> {
    let objects = match timeout(LIST_TIMEOUT, source.snapshot(&view.kind, &view.scope)).await {
        Ok(objects) => objects?,
        Err(_) => anyhow::bail!("listing {} timed out", view.kind.gvr()),
    };

    let changed = {
        let mut guard = table.write();
        let before = guard.clone();
        guard.reconcile(view.renderer.as_ref(), &view.columns, &objects)?;
        guard.diff(&before)
    };
    if changed {
        let _ = notify.send(WatchEvent::Updated(view.kind.gvr()));
    }
    Ok(())
}

fn should_process_watch_event(last: &mut Option<Instant>) -> bool {
    let now = Instant::now();
    match last {
        Some(previous) if now.duration_since(*previous) < WATCH_THROTTLE => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

pub fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }
    out.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::{SnapshotSource, TableWatcher, ViewSpec, WatchEvent, should_process_watch_event};
    use crate::kind::{KindDef, ResourceKind};
    use crate::model::NamespaceScope;
    use crate::query::ColumnSpecs;
    use crate::render::Generic;
    use anyhow::Result;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};

    struct FakeSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SnapshotSource for FakeSource {
        async fn snapshot(&self, _kind: &KindDef, _scope: &NamespaceScope) -> Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(vec![
                json!({"metadata": {"name": "a", "namespace": "default"}}),
                json!({"metadata": {"name": "b", "namespace": "default"}}),
            ])
        }
    }

    fn view() -> ViewSpec {
        ViewSpec {
            kind: ResourceKind::ConfigMaps.def(),
            scope: NamespaceScope::Named("default".to_string()),
            renderer: Arc::new(Generic),
            columns: ColumnSpecs::default(),
            refresh: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn notifies_on_first_snapshot_then_stays_quiet() {
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = TableWatcher::spawn(Arc::clone(&source), view(), tx);

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(event, Some(WatchEvent::Updated("v1/configmaps".to_string())));
        let table = watcher.table().snapshot();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.namespace(), "default");

        tokio::time::sleep(Duration::from_millis(120)).await;
        watcher.stop().await;
        assert!(source.calls.load(Ordering::SeqCst) > 2);

        let mut updates = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, WatchEvent::Updated(_)));
            updates += 1;
        }
        // The second pass only flips Add to Unchanged.
        assert!(updates <= 1);
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = TableWatcher::spawn(source, view(), tx);

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        let Some(WatchEvent::Failed { gvr, error }) = event else {
            panic!("expected a failure, got {event:?}");
        };
        assert_eq!(gvr, "v1/configmaps");
        assert_eq!(error, "connection refused");
        assert!(watcher.table().snapshot().is_empty());
        watcher.stop().await;
    }

    #[test]
    fn cluster_scoped_tables_use_dash() {
        let mut spec = view();
        spec.kind = ResourceKind::Nodes.def();
        assert_eq!(spec.table_namespace(), "-");
        spec.scope = NamespaceScope::All;
        spec.kind = ResourceKind::Pods.def();
        assert_eq!(spec.table_namespace(), "all");
    }

    #[test]
    fn watch_events_are_throttled() {
        let mut last = None;
        assert!(should_process_watch_event(&mut last));
        assert!(!should_process_watch_event(&mut last));
    }
}
