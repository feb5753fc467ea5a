use super::helpers::{
    as_status, format_bytes, format_cpu_millicores, human_age, map_to_str, missing, na,
    parse_cpu_millicores, parse_quantity,
};
use super::theme::{ColorerFunc, Theme, default_colorer};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row, RowEvent, fqn};
use anyhow::Result;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use ratatui::style::Color;
use serde_json::Value;

const NODE_LOST: &str = "NodeLost";
const RUNNING: &str = "Running";
const PENDING: &str = "Pending";
const COMPLETED: &str = "Completed";
const TERMINATING: &str = "Terminating";
const INITIALIZED: &str = "Initialized";
const POD_INITIALIZING: &str = "PodInitializing";
const CONTAINER_CREATING: &str = "ContainerCreating";

pub struct PodRenderer;

impl Renderer for PodRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("READY"),
            HeaderColumn::new("STATUS"),
            HeaderColumn::new("RESTARTS").right(),
            HeaderColumn::new("LAST RESTART").right().time().wide(),
            HeaderColumn::new("CPU/RL").right().wide(),
            HeaderColumn::new("MEM/RL").right().wide(),
            HeaderColumn::new("IP"),
            HeaderColumn::new("NODE"),
            HeaderColumn::new("SERVICE-ACCOUNT").wide(),
            HeaderColumn::new("NOMINATED NODE").wide(),
            HeaderColumn::new("READINESS GATES").wide(),
            HeaderColumn::new("QOS").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let pod: Pod = typed(object, "Pod")?;
        let spec = pod.spec.clone().unwrap_or_default();
        let status = pod.status.clone().unwrap_or_default();

        let stats = ContainerStats::collect(status.container_statuses.as_deref().unwrap_or(&[]));
        let (init_ready, init_total, init_restarts) = sidecar_stats(
            spec.init_containers.as_deref().unwrap_or(&[]),
            status.init_container_statuses.as_deref().unwrap_or(&[]),
        );
        let ready = stats.ready + init_ready;
        let total = spec.containers.len() + init_total;
        let phase = phase(&pod, &spec, &status);
        let (cpu, mem) = resource_totals(&spec.containers);

        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            format!("{ready}/{total}"),
            phase,
            (stats.restarts + init_restarts).to_string(),
            human_age(stats.last_restart.as_ref()),
            format!("{}:{}", format_cpu(cpu.0), format_cpu(cpu.1)),
            format!("{}:{}", format_bytes(mem.0), format_bytes(mem.1)),
            na(status.pod_ip.clone().unwrap_or_default()),
            na(spec.node_name.clone().unwrap_or_default()),
            na(spec.service_account_name.clone().unwrap_or_default()),
            missing(status.nominated_node_name.clone().unwrap_or_default()),
            readiness_gates(&spec, &status),
            qos(status.qos_class.as_deref()),
            map_to_str(pod.metadata.labels.as_ref()),
            as_status(&check_pod(&pod)),
            human_age(pod.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn colorer(&self) -> ColorerFunc {
        pod_colorer
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        check_pod(&typed(object, "Pod")?)
    }
}

/// Health of a pod, as reported in the VALID column.
fn check_pod(pod: &Pod) -> Result<()> {
    let spec = pod.spec.clone().unwrap_or_default();
    let status = pod.status.clone().unwrap_or_default();
    let stats = ContainerStats::collect(status.container_statuses.as_deref().unwrap_or(&[]));
    let (init_ready, init_total, _) = sidecar_stats(
        spec.init_containers.as_deref().unwrap_or(&[]),
        status.init_container_statuses.as_deref().unwrap_or(&[]),
    );

    diagnose(
        &phase(pod, &spec, &status),
        stats.ready + init_ready,
        spec.containers.len() + init_total,
    )
}

fn pod_colorer(theme: &Theme, ns: &str, header: &Header, event: &RowEvent) -> Color {
    let color = default_colorer(theme, ns, header, event);
    let Some(status) = header
        .index_of("STATUS", true)
        .and_then(|index| event.row.fields.get(index))
    else {
        return color;
    };

    match status.trim() {
        PENDING | CONTAINER_CREATING => theme.pending,
        POD_INITIALIZING => theme.add,
        INITIALIZED => theme.highlight,
        COMPLETED => theme.completed,
        RUNNING if color != theme.error => theme.std,
        TERMINATING => theme.delete,
        _ => color,
    }
}

fn diagnose(phase: &str, ready: usize, total: usize) -> Result<()> {
    if phase == COMPLETED {
        return Ok(());
    }
    if ready != total || total == 0 {
        anyhow::bail!("container ready check failed: {ready} of {total}");
    }
    if phase == TERMINATING {
        anyhow::bail!("pod is terminating");
    }
    Ok(())
}

#[derive(Default)]
struct ContainerStats {
    ready: usize,
    restarts: i32,
    last_restart: Option<Time>,
}

impl ContainerStats {
    fn collect(statuses: &[ContainerStatus]) -> Self {
        let mut stats = Self::default();
        for status in statuses {
            if status.ready {
                stats.ready += 1;
            }
            stats.restarts += status.restart_count;

            let finished = status
                .last_state
                .as_ref()
                .and_then(|state| state.terminated.as_ref())
                .and_then(|terminated| terminated.finished_at.as_ref());
            if let Some(finished) = finished {
                let newer = stats
                    .last_restart
                    .as_ref()
                    .is_none_or(|latest| finished.0.as_second() > latest.0.as_second());
                if newer {
                    stats.last_restart = Some(finished.clone());
                }
            }
        }
        stats
    }
}

fn is_sidecar(container: &Container) -> bool {
    container.restart_policy.as_deref() == Some("Always")
}

/// Restartable init containers count as regular containers.
fn sidecar_stats(containers: &[Container], statuses: &[ContainerStatus]) -> (usize, usize, i32) {
    let (mut ready, mut total, mut restarts) = (0, 0, 0);
    for status in statuses {
        let sidecar = containers
            .iter()
            .find(|container| container.name == status.name)
            .is_some_and(is_sidecar);
        if !sidecar {
            continue;
        }
        total += 1;
        if status.ready {
            ready += 1;
        }
        restarts += status.restart_count;
    }
    (ready, total, restarts)
}

fn phase(pod: &Pod, spec: &PodSpec, status: &PodStatus) -> String {
    let deleting = pod.metadata.deletion_timestamp.is_some();
    let mut phase = status.phase.clone().unwrap_or_default();
    if let Some(reason) = status.reason.as_deref().filter(|reason| !reason.is_empty()) {
        if deleting && reason == NODE_LOST {
            return "Unknown".to_string();
        }
        phase = reason.to_string();
    }

    if let Some(init) = init_container_phase(spec, status) {
        return init;
    }

    let (phase, running) = container_phase(status, phase);
    if deleting {
        return TERMINATING.to_string();
    }
    if running && phase == COMPLETED {
        return RUNNING.to_string();
    }
    phase
}

fn container_phase(status: &PodStatus, mut phase: String) -> (String, bool) {
    let mut running = false;
    for container in status.container_statuses.iter().flatten().rev() {
        let state = container.state.clone().unwrap_or_default();
        let waiting = state
            .waiting
            .as_ref()
            .and_then(|waiting| waiting.reason.clone())
            .filter(|reason| !reason.is_empty());
        if let Some(reason) = waiting {
            phase = reason;
            continue;
        }
        if let Some(terminated) = state.terminated.as_ref() {
            phase = match terminated.reason.as_deref().filter(|reason| !reason.is_empty()) {
                Some(reason) => reason.to_string(),
                None => match terminated.signal.filter(|signal| *signal != 0) {
                    Some(signal) => format!("Signal:{signal}"),
                    None => format!("ExitCode:{}", terminated.exit_code),
                },
            };
            continue;
        }
        if container.ready && state.running.is_some() {
            running = true;
        }
    }
    (phase, running)
}

fn init_container_phase(spec: &PodSpec, status: &PodStatus) -> Option<String> {
    let containers = spec.init_containers.as_deref().unwrap_or(&[]);
    let count = containers.len();
    for (index, container) in status.init_container_statuses.iter().flatten().enumerate() {
        let sidecar = containers
            .iter()
            .find(|spec| spec.name == container.name)
            .is_some_and(is_sidecar);
        if let Some(phase) = init_container_status(container, index, count, sidecar) {
            return Some(phase);
        }
    }
    None
}

fn init_container_status(
    container: &ContainerStatus,
    index: usize,
    count: usize,
    sidecar: bool,
) -> Option<String> {
    let state = container.state.clone().unwrap_or_default();
    if let Some(terminated) = state.terminated {
        if terminated.exit_code == 0 {
            return None;
        }
        if let Some(reason) = terminated.reason.filter(|reason| !reason.is_empty()) {
            return Some(format!("Init:{reason}"));
        }
        if let Some(signal) = terminated.signal.filter(|signal| *signal != 0) {
            return Some(format!("Init:Signal:{signal}"));
        }
        return Some(format!("Init:ExitCode:{}", terminated.exit_code));
    }
    if sidecar && container.started == Some(true) {
        if container.ready {
            return None;
        }
    } else if let Some(reason) = state
        .waiting
        .and_then(|waiting| waiting.reason)
        .filter(|reason| !reason.is_empty() && reason != POD_INITIALIZING)
    {
        return Some(format!("Init:{reason}"));
    }

    Some(format!("Init:{index}/{count}"))
}

fn resource_totals(containers: &[Container]) -> ((u64, u64), (u64, u64)) {
    let (mut cpu, mut mem) = ((0, 0), (0, 0));
    for container in containers {
        let Some(resources) = container.resources.as_ref() else {
            continue;
        };
        if let Some(requests) = resources.requests.as_ref() {
            cpu.0 += requests
                .get("cpu")
                .and_then(|quantity| parse_cpu_millicores(&quantity.0))
                .unwrap_or(0);
            mem.0 += requests
                .get("memory")
                .and_then(|quantity| parse_quantity(&quantity.0))
                .map_or(0, |bytes| bytes.round() as u64);
        }
        if let Some(limits) = resources.limits.as_ref() {
            cpu.1 += limits
                .get("cpu")
                .and_then(|quantity| parse_cpu_millicores(&quantity.0))
                .unwrap_or(0);
            mem.1 += limits
                .get("memory")
                .and_then(|quantity| parse_quantity(&quantity.0))
                .map_or(0, |bytes| bytes.round() as u64);
        }
    }
    (cpu, mem)
}

fn format_cpu(millicores: u64) -> String {
    if millicores == 0 {
        return "0".to_string();
    }
    format_cpu_millicores(millicores)
}

fn readiness_gates(spec: &PodSpec, status: &PodStatus) -> String {
    let gates = spec.readiness_gates.as_deref().unwrap_or(&[]);
    if gates.is_empty() {
        return missing("");
    }

    let conditions = status.conditions.as_deref().unwrap_or(&[]);
    let passing = gates
        .iter()
        .filter(|gate| {
            conditions
                .iter()
                .find(|condition| condition.type_ == gate.condition_type)
                .is_some_and(|condition| condition.status == "True")
        })
        .count();
    format!("{passing}/{}", gates.len())
}

fn qos(class: Option<&str>) -> String {
    match class {
        Some("Guaranteed") => "GA",
        Some("Burstable") => "BU",
        _ => "BE",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::PodRenderer;
    use crate::model::{ResEvent, Row, RowEvent};
    use crate::render::{Renderer, Theme};
    use serde_json::{Value, json};

    fn pod(status: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "fred",
                "namespace": "blee",
                "labels": {"app": "fred"},
                "creationTimestamp": "2024-01-01T00:00:00Z"
            },
            "spec": {
                "nodeName": "node-1",
                "serviceAccountName": "default",
                "containers": [{
                    "name": "c1",
                    "image": "nginx",
                    "resources": {
                        "requests": {"cpu": "100m", "memory": "64Mi"},
                        "limits": {"cpu": "1", "memory": "128Mi"}
                    }
                }]
            },
            "status": status
        })
    }

    fn running() -> Value {
        json!({
            "phase": "Running",
            "podIP": "10.0.0.7",
            "qosClass": "Burstable",
            "containerStatuses": [{
                "name": "c1",
                "image": "nginx",
                "imageID": "sha",
                "ready": true,
                "restartCount": 2,
                "state": {"running": {"startedAt": "2024-01-01T00:00:10Z"}}
            }]
        })
    }

    fn render(object: &Value) -> Row {
        let mut row = Row::default();
        PodRenderer.render(object, "blee", &mut row).unwrap();
        row
    }

    fn field<'a>(row: &'a Row, name: &str) -> &'a str {
        let index = PodRenderer.header("blee").index_of(name, true).unwrap();
        &row.fields[index]
    }

    #[test]
    fn running_pod_row() {
        let row = render(&pod(running()));
        assert_eq!(row.id, "blee/fred");
        assert_eq!(row.fields.len(), PodRenderer.header("blee").len());
        assert_eq!(field(&row, "READY"), "1/1");
        assert_eq!(field(&row, "STATUS"), "Running");
        assert_eq!(field(&row, "RESTARTS"), "2");
        assert_eq!(field(&row, "CPU/RL"), "100m:1.00c");
        assert_eq!(field(&row, "MEM/RL"), "64.0Mi:128.0Mi");
        assert_eq!(field(&row, "IP"), "10.0.0.7");
        assert_eq!(field(&row, "NOMINATED NODE"), "<none>");
        assert_eq!(field(&row, "QOS"), "BU");
        assert_eq!(field(&row, "LABELS"), "app=fred");
        assert_eq!(field(&row, "VALID"), "");
        assert!(PodRenderer.healthy(&pod(running())).is_ok());
    }

    #[test]
    fn waiting_pod_is_unhealthy() {
        let status = json!({
            "phase": "Pending",
            "containerStatuses": [{
                "name": "c1",
                "image": "nginx",
                "imageID": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "ContainerCreating"}}
            }]
        });
        let row = render(&pod(status.clone()));
        assert_eq!(field(&row, "STATUS"), "ContainerCreating");
        assert_eq!(field(&row, "READY"), "0/1");
        assert_eq!(field(&row, "VALID"), "container ready check failed: 0 of 1");
        assert!(PodRenderer.healthy(&pod(status)).is_err());
    }

    #[test]
    fn deleting_pod_is_terminating() {
        let mut object = pod(running());
        object["metadata"]["deletionTimestamp"] = json!("2024-01-01T00:05:00Z");
        let row = render(&object);
        assert_eq!(field(&row, "STATUS"), "Terminating");
        assert_eq!(field(&row, "VALID"), "pod is terminating");
    }

    #[test]
    fn init_containers_report_progress() {
        let mut object = pod(json!({
            "phase": "Pending",
            "initContainerStatuses": [{
                "name": "init",
                "image": "busybox",
                "imageID": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "PodInitializing"}}
            }]
        }));
        object["spec"]["initContainers"] = json!([{"name": "init", "image": "busybox"}]);
        assert_eq!(field(&render(&object), "STATUS"), "Init:0/1");
    }

    #[test]
    fn colorer_follows_status() {
        let theme = Theme::default();
        let header = PodRenderer.header("blee");
        let colorer = PodRenderer.colorer();

        let row = render(&pod(running()));
        let event = RowEvent::new(ResEvent::Unchanged, row.clone());
        assert_eq!(colorer(&theme, "blee", &header, &event), theme.std);

        let mut pending = row;
        let status = header.index_of("STATUS", true).unwrap();
        pending.fields[status] = "Pending".to_string();
        let event = RowEvent::new(ResEvent::Add, pending);
        assert_eq!(colorer(&theme, "blee", &header, &event), theme.pending);
    }

    #[test]
    fn rejects_other_kinds() {
        let mut row = Row::default();
        let object = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "x"}});
        assert!(PodRenderer.render(&object, "", &mut row).is_err());
    }
}
