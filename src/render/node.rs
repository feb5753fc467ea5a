use super::helpers::{
    as_status, format_bytes, format_cpu_millicores, human_age, map_to_str, missing, na,
    parse_cpu_millicores, parse_quantity,
};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row};
use anyhow::Result;
use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::ResourceExt;
use serde_json::Value;

const ROLE_PREFIX: &str = "node-role.kubernetes.io/";
const ROLE_LABEL: &str = "kubernetes.io/role";
const CORDONED: &str = "SchedulingDisabled";

pub struct NodeRenderer;

impl Renderer for NodeRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAME"),
            HeaderColumn::new("STATUS"),
            HeaderColumn::new("ROLE"),
            HeaderColumn::new("ARCH").wide(),
            HeaderColumn::new("TAINTS").right(),
            HeaderColumn::new("VERSION"),
            HeaderColumn::new("OS-IMAGE").wide(),
            HeaderColumn::new("KERNEL").wide(),
            HeaderColumn::new("INTERNAL-IP").wide(),
            HeaderColumn::new("EXTERNAL-IP").wide(),
            HeaderColumn::new("CPU/A").right(),
            HeaderColumn::new("MEM/A").right().capacity(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let node: Node = typed(object, "Node")?;
        let status = node.status.clone().unwrap_or_default();
        let info = status.node_info.clone().unwrap_or_default();
        let statuses = node_statuses(&node);
        let (internal, external) = addresses(&node);
        let allocatable = status.allocatable.clone().unwrap_or_default();
        let cpu = allocatable
            .get("cpu")
            .and_then(|quantity| parse_cpu_millicores(&quantity.0))
            .map_or_else(|| na(""), format_cpu_millicores);
        let memory = allocatable
            .get("memory")
            .and_then(|quantity| parse_quantity(&quantity.0))
            .map_or_else(|| na(""), |bytes| format_bytes(bytes.round() as u64));

        row.id = node.name_any();
        row.fields = vec![
            node.name_any(),
            statuses.join(","),
            node_roles(&node),
            na(info.architecture),
            node.spec
                .as_ref()
                .and_then(|spec| spec.taints.as_ref())
                .map_or(0, Vec::len)
                .to_string(),
            na(info.kubelet_version),
            na(info.os_image),
            na(info.kernel_version),
            missing(internal),
            missing(external),
            cpu,
            memory,
            map_to_str(node.metadata.labels.as_ref()),
            as_status(&diagnose_node(&statuses)),
            human_age(node.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let node: Node = typed(object, "Node")?;
        diagnose_node(&node_statuses(&node))
    }
}

fn node_statuses(node: &Node) -> Vec<String> {
    let mut statuses = node
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|condition| condition.type_ == "Ready")
        })
        .map(|condition| {
            if condition.status == "True" {
                vec!["Ready".to_string()]
            } else {
                vec!["NotReady".to_string()]
            }
        })
        .unwrap_or_else(|| vec!["Unknown".to_string()]);

    if node
        .spec
        .as_ref()
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false)
    {
        statuses.push(CORDONED.to_string());
    }
    statuses
}

fn diagnose_node(statuses: &[String]) -> Result<()> {
    if statuses.iter().any(|status| status == CORDONED) {
        anyhow::bail!("node is cordoned");
    }
    if !statuses.iter().any(|status| status == "Ready") {
        anyhow::bail!("node is not ready");
    }
    Ok(())
}

fn node_roles(node: &Node) -> String {
    let Some(labels) = node.metadata.labels.as_ref() else {
        return missing("");
    };

    let mut roles = labels
        .iter()
        .filter_map(|(key, value)| {
            if let Some(role) = key.strip_prefix(ROLE_PREFIX) {
                return (!role.is_empty()).then(|| role.to_string());
            }
            (key.ends_with(ROLE_LABEL) && !value.is_empty()).then(|| value.clone())
        })
        .collect::<Vec<_>>();

    roles.sort();
    roles.dedup();
    missing(roles.join(","))
}

fn addresses(node: &Node) -> (String, String) {
    let (mut internal, mut external) = (String::new(), String::new());
    let entries = node
        .status
        .as_ref()
        .and_then(|status| status.addresses.as_deref())
        .unwrap_or(&[]);
    for address in entries {
        match address.type_.as_str() {
            "InternalIP" => internal = address.address.clone(),
            "ExternalIP" => external = address.address.clone(),
            _ => {}
        }
    }
    (internal, external)
}

pub struct NamespaceRenderer;

impl Renderer for NamespaceRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAME"),
            HeaderColumn::new("STATUS"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let namespace: Namespace = typed(object, "Namespace")?;
        let phase = namespace_phase(&namespace);

        row.id = namespace.name_any();
        row.fields = vec![
            namespace.name_any(),
            phase.clone(),
            map_to_str(namespace.metadata.labels.as_ref()),
            as_status(&diagnose_namespace(&phase)),
            human_age(namespace.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let namespace: Namespace = typed(object, "Namespace")?;
        diagnose_namespace(&namespace_phase(&namespace))
    }
}

fn namespace_phase(namespace: &Namespace) -> String {
    namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Active".to_string())
}

fn diagnose_namespace(phase: &str) -> Result<()> {
    if phase != "Active" && phase != "Terminating" {
        anyhow::bail!("namespace not ready");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{NamespaceRenderer, NodeRenderer};
    use crate::model::Row;
    use crate::render::Renderer;
    use serde_json::json;

    fn field<'a>(renderer: &dyn Renderer, row: &'a Row, name: &str) -> &'a str {
        let index = renderer.header("-").index_of(name, true).unwrap();
        &row.fields[index]
    }

    #[test]
    fn ready_worker_node() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {
                "name": "node-1",
                "labels": {"node-role.kubernetes.io/control-plane": "", "kubernetes.io/role": "master"}
            },
            "spec": {"taints": [{"key": "k", "effect": "NoSchedule"}]},
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "addresses": [{"type": "InternalIP", "address": "10.1.0.4"}],
                "allocatable": {"cpu": "4", "memory": "8Gi"}
            }
        });
        let mut row = Row::default();
        NodeRenderer.render(&object, "-", &mut row).unwrap();
        assert_eq!(row.id, "node-1");
        assert_eq!(row.fields.len(), NodeRenderer.header("-").len());
        assert_eq!(field(&NodeRenderer, &row, "STATUS"), "Ready");
        assert_eq!(field(&NodeRenderer, &row, "ROLE"), "control-plane,master");
        assert_eq!(field(&NodeRenderer, &row, "TAINTS"), "1");
        assert_eq!(field(&NodeRenderer, &row, "INTERNAL-IP"), "10.1.0.4");
        assert_eq!(field(&NodeRenderer, &row, "EXTERNAL-IP"), "<none>");
        assert_eq!(field(&NodeRenderer, &row, "CPU/A"), "4.00c");
        assert_eq!(field(&NodeRenderer, &row, "MEM/A"), "8.0Gi");
        assert!(NodeRenderer.healthy(&object).is_ok());
    }

    #[test]
    fn cordoned_node_is_unhealthy() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": "node-2"},
            "spec": {"unschedulable": true},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        });
        let mut row = Row::default();
        NodeRenderer.render(&object, "-", &mut row).unwrap();
        assert_eq!(field(&NodeRenderer, &row, "STATUS"), "Ready,SchedulingDisabled");
        assert_eq!(field(&NodeRenderer, &row, "VALID"), "node is cordoned");
        assert_eq!(field(&NodeRenderer, &row, "ROLE"), "<none>");
    }

    #[test]
    fn namespace_row() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "kube-system"},
            "status": {"phase": "Active"}
        });
        let mut row = Row::default();
        NamespaceRenderer.render(&object, "-", &mut row).unwrap();
        assert_eq!(row.fields[..2], ["kube-system", "Active"]);
        assert!(NamespaceRenderer.healthy(&object).is_ok());
    }
}
