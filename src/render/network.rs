use super::helpers::{human_age, map_to_str, missing};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row, fqn};
use anyhow::Result;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde_json::Value;

pub struct ServiceRenderer;

impl Renderer for ServiceRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("TYPE"),
            HeaderColumn::new("CLUSTER-IP"),
            HeaderColumn::new("EXTERNAL-IP"),
            HeaderColumn::new("SELECTOR").wide(),
            HeaderColumn::new("PORTS"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let service: Service = typed(object, "Service")?;
        let spec = service.spec.clone().unwrap_or_default();
        let service_type = spec.type_.clone().unwrap_or_else(|| "ClusterIP".to_string());
        let cluster_ip = spec
            .cluster_ip
            .clone()
            .filter(|ip| ip != "None")
            .unwrap_or_default();

        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            service_type.clone(),
            cluster_ip,
            external_ips(&service, &service_type),
            map_to_str(spec.selector.as_ref()),
            ports_to_str(spec.ports.as_deref().unwrap_or(&[])),
            map_to_str(service.metadata.labels.as_ref()),
            String::new(),
            human_age(service.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }
}

fn external_ips(service: &Service, service_type: &str) -> String {
    let spec = service.spec.clone().unwrap_or_default();
    let declared = spec.external_ips.clone().unwrap_or_default();
    let mut ips = match service_type {
        "LoadBalancer" => {
            let mut ips = service
                .status
                .as_ref()
                .and_then(|status| status.load_balancer.as_ref())
                .and_then(|balancer| balancer.ingress.as_ref())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            ips.extend(declared);
            ips
        }
        "ExternalName" => spec.external_name.into_iter().collect(),
        _ => declared,
    };

    if ips.is_empty() {
        return if service_type == "LoadBalancer" {
            "<pending>".to_string()
        } else {
            String::new()
        };
    }
    ips.sort();
    ips.join(",")
}

fn ports_to_str(ports: &[ServicePort]) -> String {
    ports
        .iter()
        .map(|port| {
            let mut out = port
                .name
                .as_deref()
                .filter(|name| !name.is_empty())
                .map(|name| format!("{name}:"))
                .unwrap_or_default();
            out.push_str(&port.port.to_string());
            if let Some(node_port) = port.node_port {
                out.push_str(&format!("►{node_port}"));
            }
            if let Some(protocol) = port.protocol.as_deref().filter(|protocol| *protocol != "TCP") {
                out.push_str(&format!("/{protocol}"));
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct IngressRenderer;

impl Renderer for IngressRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("CLASS"),
            HeaderColumn::new("HOSTS"),
            HeaderColumn::new("ADDRESS"),
            HeaderColumn::new("PORTS"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let ingress: Ingress = typed(object, "Ingress")?;
        let spec = ingress.spec.clone().unwrap_or_default();
        let hosts = spec
            .rules
            .iter()
            .flatten()
            .filter_map(|rule| rule.host.clone())
            .collect::<Vec<_>>()
            .join(",");
        let address = ingress
            .status
            .as_ref()
            .and_then(|status| status.load_balancer.as_ref())
            .and_then(|balancer| balancer.ingress.as_ref())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let ports = if spec.tls.as_ref().is_some_and(|tls| !tls.is_empty()) {
            "80, 443"
        } else {
            "80"
        };

        let namespace = ingress.namespace().unwrap_or_default();
        let name = ingress.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            missing(spec.ingress_class_name.clone().unwrap_or_default()),
            missing(hosts),
            address,
            ports.to_string(),
            map_to_str(ingress.metadata.labels.as_ref()),
            String::new(),
            human_age(ingress.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{IngressRenderer, ServiceRenderer};
    use crate::model::Row;
    use crate::render::Renderer;
    use serde_json::json;

    fn field<'a>(renderer: &dyn Renderer, row: &'a Row, name: &str) -> &'a str {
        let index = renderer.header("default").index_of(name, true).unwrap();
        &row.fields[index]
    }

    #[test]
    fn cluster_ip_service() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {
                "type": "NodePort",
                "clusterIP": "10.0.0.1",
                "selector": {"app": "web"},
                "ports": [
                    {"name": "http", "port": 80, "nodePort": 30080, "protocol": "TCP"},
                    {"port": 53, "protocol": "UDP"}
                ]
            }
        });
        let mut row = Row::default();
        ServiceRenderer.render(&object, "default", &mut row).unwrap();
        assert_eq!(row.fields.len(), ServiceRenderer.header("default").len());
        assert_eq!(field(&ServiceRenderer, &row, "CLUSTER-IP"), "10.0.0.1");
        assert_eq!(field(&ServiceRenderer, &row, "EXTERNAL-IP"), "");
        assert_eq!(field(&ServiceRenderer, &row, "PORTS"), "http:80►30080 53/UDP");
        assert_eq!(field(&ServiceRenderer, &row, "SELECTOR"), "app=web");
    }

    #[test]
    fn pending_load_balancer() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "lb", "namespace": "default"},
            "spec": {"type": "LoadBalancer", "clusterIP": "None"}
        });
        let mut row = Row::default();
        ServiceRenderer.render(&object, "default", &mut row).unwrap();
        assert_eq!(field(&ServiceRenderer, &row, "CLUSTER-IP"), "");
        assert_eq!(field(&ServiceRenderer, &row, "EXTERNAL-IP"), "<pending>");
    }

    #[test]
    fn ingress_row() {
        let object = json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {"name": "site", "namespace": "default"},
            "spec": {
                "ingressClassName": "nginx",
                "rules": [{"host": "a.example.com"}, {"host": "b.example.com"}],
                "tls": [{"hosts": ["a.example.com"]}]
            },
            "status": {"loadBalancer": {"ingress": [{"ip": "1.2.3.4"}]}}
        });
        let mut row = Row::default();
        IngressRenderer.render(&object, "default", &mut row).unwrap();
        assert_eq!(field(&IngressRenderer, &row, "CLASS"), "nginx");
        assert_eq!(field(&IngressRenderer, &row, "HOSTS"), "a.example.com,b.example.com");
        assert_eq!(field(&IngressRenderer, &row, "ADDRESS"), "1.2.3.4");
        assert_eq!(field(&IngressRenderer, &row, "PORTS"), "80, 443");
    }
}
