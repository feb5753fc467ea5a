use super::helpers::{as_status, human_age, map_to_str, missing};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row, fqn};
use anyhow::Result;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use serde_json::Value;

const MAX_SHOWN: usize = 2;

fn check_replicas(ready: i32, desired: i32) -> Result<()> {
    if ready != desired {
        anyhow::bail!("ready replicas mismatch: {ready} of {desired}");
    }
    Ok(())
}

pub(super) fn selector_to_str(selector: Option<&LabelSelector>) -> String {
    let Some(selector) = selector else {
        return missing("");
    };
    if let Some(labels) = selector.match_labels.as_ref().filter(|labels| !labels.is_empty()) {
        return map_to_str(Some(labels));
    }

    selector
        .match_expressions
        .iter()
        .flatten()
        .map(|requirement| {
            let values = requirement.values.clone().unwrap_or_default().join(",");
            format!("{} {} ({values})", requirement.key, requirement.operator)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Container names and images, init containers first, capped at two of each.
pub(super) fn containers_summary(spec: Option<&PodSpec>) -> (String, String) {
    let Some(spec) = spec else {
        return (missing(""), missing(""));
    };

    let (names, images): (Vec<_>, Vec<_>) = spec
        .init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
        .map(|container| {
            (
                container.name.clone(),
                container.image.clone().unwrap_or_default(),
            )
        })
        .unzip();

    (cap(names), cap(images))
}

fn cap(mut values: Vec<String>) -> String {
    if values.len() > MAX_SHOWN {
        let extra = values.len() - MAX_SHOWN;
        values.truncate(MAX_SHOWN);
        values.push(format!("(+{extra})..."));
    }
    values.join(",")
}

pub struct DeploymentRenderer;

impl Renderer for DeploymentRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("READY").right(),
            HeaderColumn::new("UP-TO-DATE").right(),
            HeaderColumn::new("AVAILABLE").right(),
            HeaderColumn::new("CONTAINERS").wide(),
            HeaderColumn::new("IMAGES").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let deployment: Deployment = typed(object, "Deployment")?;
        let (ready, desired) = deployment_replicas(&deployment);
        let status = deployment.status.clone().unwrap_or_default();
        let (containers, images) = containers_summary(
            deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref()),
        );

        let namespace = deployment.namespace().unwrap_or_default();
        let name = deployment.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            format!("{ready}/{desired}"),
            status.updated_replicas.unwrap_or(0).to_string(),
            status.available_replicas.unwrap_or(0).to_string(),
            containers,
            images,
            map_to_str(deployment.metadata.labels.as_ref()),
            as_status(&check_replicas(ready, desired)),
            human_age(deployment.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let deployment: Deployment = typed(object, "Deployment")?;
        let (ready, desired) = deployment_replicas(&deployment);
        check_replicas(ready, desired)
    }
}

fn deployment_replicas(deployment: &Deployment) -> (i32, i32) {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    (ready, desired)
}

pub struct StatefulSetRenderer;

impl Renderer for StatefulSetRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("READY").right(),
            HeaderColumn::new("CURRENT").right(),
            HeaderColumn::new("SELECTOR").wide(),
            HeaderColumn::new("CONTAINERS").wide(),
            HeaderColumn::new("IMAGES").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let statefulset: StatefulSet = typed(object, "StatefulSet")?;
        let spec = statefulset.spec.as_ref();
        let (ready, desired) = statefulset_replicas(&statefulset);
        let current = statefulset
            .status
            .as_ref()
            .and_then(|status| status.current_replicas)
            .unwrap_or(0);
        let (containers, images) =
            containers_summary(spec.and_then(|spec| spec.template.spec.as_ref()));

        let namespace = statefulset.namespace().unwrap_or_default();
        let name = statefulset.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            format!("{ready}/{desired}"),
            current.to_string(),
            selector_to_str(spec.map(|spec| &spec.selector)),
            containers,
            images,
            map_to_str(statefulset.metadata.labels.as_ref()),
            as_status(&check_replicas(ready, desired)),
            human_age(statefulset.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let statefulset: StatefulSet = typed(object, "StatefulSet")?;
        let (ready, desired) = statefulset_replicas(&statefulset);
        check_replicas(ready, desired)
    }
}

fn statefulset_replicas(statefulset: &StatefulSet) -> (i32, i32) {
    let desired = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = statefulset
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    (ready, desired)
}

pub struct DaemonSetRenderer;

impl Renderer for DaemonSetRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("DESIRED").right(),
            HeaderColumn::new("CURRENT").right(),
            HeaderColumn::new("READY").right(),
            HeaderColumn::new("UP-TO-DATE").right(),
            HeaderColumn::new("AVAILABLE").right(),
            HeaderColumn::new("NODE SELECTOR").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let daemonset: DaemonSet = typed(object, "DaemonSet")?;
        let status = daemonset.status.clone().unwrap_or_default();
        let node_selector = daemonset
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .and_then(|spec| spec.node_selector.as_ref())
            .map(|selector| map_to_str(Some(selector)))
            .unwrap_or_default();

        let namespace = daemonset.namespace().unwrap_or_default();
        let name = daemonset.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            status.desired_number_scheduled.to_string(),
            status.current_number_scheduled.to_string(),
            status.number_ready.to_string(),
            status.updated_number_scheduled.unwrap_or(0).to_string(),
            status.number_available.unwrap_or(0).to_string(),
            missing(node_selector),
            map_to_str(daemonset.metadata.labels.as_ref()),
            as_status(&check_replicas(
                status.number_ready,
                status.desired_number_scheduled,
            )),
            human_age(daemonset.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let daemonset: DaemonSet = typed(object, "DaemonSet")?;
        let status = daemonset.status.unwrap_or_default();
        check_replicas(status.number_ready, status.desired_number_scheduled)
    }
}

pub struct ReplicaSetRenderer;

impl Renderer for ReplicaSetRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("DESIRED").right(),
            HeaderColumn::new("CURRENT").right(),
            HeaderColumn::new("READY").right(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let replicaset: ReplicaSet = typed(object, "ReplicaSet")?;
        let (ready, desired) = replicaset_replicas(&replicaset);
        let status = replicaset.status.clone().unwrap_or_default();

        let namespace = replicaset.namespace().unwrap_or_default();
        let name = replicaset.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            desired.to_string(),
            status.replicas.to_string(),
            ready.to_string(),
            map_to_str(replicaset.metadata.labels.as_ref()),
            as_status(&check_replicas(ready, desired)),
            human_age(replicaset.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let replicaset: ReplicaSet = typed(object, "ReplicaSet")?;
        let (ready, desired) = replicaset_replicas(&replicaset);
        check_replicas(ready, desired)
    }
}

fn replicaset_replicas(replicaset: &ReplicaSet) -> (i32, i32) {
    let desired = replicaset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = replicaset
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    (ready, desired)
}
