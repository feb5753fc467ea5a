use super::helpers::{human_age, map_to_str};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row, fqn};
use anyhow::Result;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use kube::ResourceExt;
use serde_json::Value;

pub struct ConfigMapRenderer;

impl Renderer for ConfigMapRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("DATA").right(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let configmap: ConfigMap = typed(object, "ConfigMap")?;
        let entries = configmap.data.as_ref().map_or(0, |data| data.len())
            + configmap.binary_data.as_ref().map_or(0, |data| data.len());

        let namespace = configmap.namespace().unwrap_or_default();
        let name = configmap.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            entries.to_string(),
            map_to_str(configmap.metadata.labels.as_ref()),
            String::new(),
            human_age(configmap.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }
}

pub struct SecretRenderer;

impl Renderer for SecretRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("TYPE").decorated(short_secret_type),
            HeaderColumn::new("DATA").right(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let secret: Secret = typed(object, "Secret")?;
        let entries = secret.data.as_ref().map_or(0, |data| data.len())
            + secret.string_data.as_ref().map_or(0, |data| data.len());

        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            secret.type_.clone().unwrap_or_else(|| "Opaque".to_string()),
            entries.to_string(),
            map_to_str(secret.metadata.labels.as_ref()),
            String::new(),
            human_age(secret.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }
}

/// Built-in secret types lose their `kubernetes.io/` prefix on screen. The
/// stored value stays whole for filters and sorting.
fn short_secret_type(value: &str) -> String {
    value.strip_prefix("kubernetes.io/").unwrap_or(value).to_string()
}

pub struct ServiceAccountRenderer;

impl Renderer for ServiceAccountRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("SECRET").right(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let account: ServiceAccount = typed(object, "ServiceAccount")?;

        let namespace = account.namespace().unwrap_or_default();
        let name = account.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            account.secrets.as_ref().map_or(0, Vec::len).to_string(),
            map_to_str(account.metadata.labels.as_ref()),
            String::new(),
            human_age(account.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigMapRenderer, SecretRenderer, ServiceAccountRenderer};
    use crate::model::Row;
    use crate::render::Renderer;
    use serde_json::json;

    #[test]
    fn configmap_counts_text_and_binary_keys() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "default"},
            "data": {"a": "1", "b": "2"},
            "binaryData": {"c": "AA=="}
        });
        let mut row = Row::default();
        ConfigMapRenderer.render(&object, "default", &mut row).unwrap();
        assert_eq!(row.id, "default/settings");
        assert_eq!(row.fields[2], "3");
    }

    #[test]
    fn secret_defaults_to_opaque() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "creds", "namespace": "default"},
            "data": {"user": "Zm9v"}
        });
        let mut row = Row::default();
        SecretRenderer.render(&object, "default", &mut row).unwrap();
        assert_eq!(row.fields[2..4], ["Opaque", "1"]);
    }

    #[test]
    fn builtin_secret_types_display_short() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "sa-token", "namespace": "default"},
            "type": "kubernetes.io/service-account-token"
        });
        let mut row = Row::default();
        SecretRenderer.render(&object, "default", &mut row).unwrap();
        assert_eq!(row.fields[2], "kubernetes.io/service-account-token");

        let header = SecretRenderer.header("default");
        let column = &header[2];
        assert_eq!(column.decorate(&row.fields[2]), "service-account-token");
        assert_eq!(column.decorate("Opaque"), "Opaque");
    }

    #[test]
    fn service_account_secrets() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": {"name": "builder", "namespace": "ci"},
            "secrets": [{"name": "builder-token"}]
        });
        let mut row = Row::default();
        ServiceAccountRenderer.render(&object, "ci", &mut row).unwrap();
        assert_eq!(row.fields.len(), ServiceAccountRenderer.header("ci").len());
        assert_eq!(row.fields[2], "1");
    }
}
