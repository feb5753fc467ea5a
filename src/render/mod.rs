mod config_map;
mod event;
mod generic;
pub mod helpers;
mod job;
mod network;
mod node;
mod pod;
mod storage;
pub mod theme;
mod workload;

pub use config_map::{ConfigMapRenderer, SecretRenderer, ServiceAccountRenderer};
pub use event::EventRenderer;
pub use generic::Generic;
pub use job::{CronJobRenderer, JobRenderer};
pub use network::{IngressRenderer, ServiceRenderer};
pub use node::{NamespaceRenderer, NodeRenderer};
pub use pod::PodRenderer;
pub use storage::{PersistentVolumeClaimRenderer, PersistentVolumeRenderer};
pub use theme::{ColorerFunc, Theme, default_colorer};
pub use workload::{DaemonSetRenderer, DeploymentRenderer, ReplicaSetRenderer, StatefulSetRenderer};

use crate::model::{Header, Row, Rows};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Turns one resource kind into table rows.
pub trait Renderer: Send + Sync {
    fn header(&self, ns: &str) -> Header;

    /// Fills `row` from `object`. Fails when the object is not of the
    /// renderer's kind.
    fn render(&self, object: &Value, ns: &str, row: &mut Row) -> Result<()>;

    fn colorer(&self) -> ColorerFunc {
        default_colorer
    }

    /// Errors describe why the instance is unhealthy. Renderers with a
    /// VALID column fill it from the same check, so the two always agree.
    fn healthy(&self, _object: &Value) -> Result<()> {
        Ok(())
    }
}

/// Renderers keyed by `group/version/resource` (`v1/pods`,
/// `apps/v1/deployments`), with the generic renderer for anything else.
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn Renderer>>,
    generic: Arc<dyn Renderer>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = Self {
            renderers: HashMap::new(),
            generic: Arc::new(Generic),
        };
        registry.register("v1/pods", PodRenderer);
        registry.register("v1/services", ServiceRenderer);
        registry.register("v1/nodes", NodeRenderer);
        registry.register("v1/namespaces", NamespaceRenderer);
        registry.register("v1/configmaps", ConfigMapRenderer);
        registry.register("v1/secrets", SecretRenderer);
        registry.register("v1/serviceaccounts", ServiceAccountRenderer);
        registry.register("v1/persistentvolumes", PersistentVolumeRenderer);
        registry.register("v1/persistentvolumeclaims", PersistentVolumeClaimRenderer);
        registry.register("v1/events", EventRenderer);
        registry.register("apps/v1/deployments", DeploymentRenderer);
        registry.register("apps/v1/statefulsets", StatefulSetRenderer);
        registry.register("apps/v1/daemonsets", DaemonSetRenderer);
        registry.register("apps/v1/replicasets", ReplicaSetRenderer);
        registry.register("batch/v1/jobs", JobRenderer);
        registry.register("batch/v1/cronjobs", CronJobRenderer);
        registry.register("networking.k8s.io/v1/ingresses", IngressRenderer);
        registry
    }
}

impl RendererRegistry {
    pub fn register(&mut self, gvr: impl Into<String>, renderer: impl Renderer + 'static) {
        self.renderers.insert(gvr.into(), Arc::new(renderer));
    }

    pub fn lookup(&self, gvr: &str) -> Arc<dyn Renderer> {
        self.renderers
            .get(gvr)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.generic))
    }

    pub fn is_registered(&self, gvr: &str) -> bool {
        self.renderers.contains_key(gvr)
    }
}

/// Renders every object, skipping the ones the renderer rejects.
pub fn hydrate(ns: &str, objects: &[Value], renderer: &dyn Renderer) -> Vec<(usize, Row)> {
    let mut rows = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        let mut row = Row::default();
        if let Err(error) = renderer.render(object, ns, &mut row) {
            warn!("skipping {}: {error:#}", object_label(object));
            continue;
        }
        rows.push((index, row));
    }
    rows
}

pub fn rows_only(rendered: Vec<(usize, Row)>) -> Rows {
    rendered.into_iter().map(|(_, row)| row).collect()
}

/// Deserializes a semi-structured object into its typed view.
pub(crate) fn typed<T: DeserializeOwned>(object: &Value, kind: &str) -> Result<T> {
    if let Some(actual) = object.get("kind").and_then(Value::as_str)
        && actual != kind
    {
        anyhow::bail!("expected {kind} but got {actual}");
    }
    T::deserialize(object).with_context(|| format!("expected {kind} object"))
}

fn object_label(object: &Value) -> String {
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or("object");
    let name = object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>");
    format!("{kind} {name}")
}
