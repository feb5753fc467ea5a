use super::Renderer;
use super::helpers::{human_age, map_to_str};
use crate::model::{Header, HeaderColumn, Row, fqn, is_cluster_scoped};
use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use serde_json::Value;

/// Metadata-only rendering for kinds without a dedicated renderer.
pub struct Generic;

impl Renderer for Generic {
    fn header(&self, ns: &str) -> Header {
        let mut columns = Vec::with_capacity(5);
        if !is_cluster_scoped(ns) {
            columns.push(HeaderColumn::new("NAMESPACE"));
        }
        columns.extend([
            HeaderColumn::new("NAME"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ]);
        Header::new(columns)
    }

    fn render(&self, object: &Value, ns: &str, row: &mut Row) -> Result<()> {
        let metadata = object
            .get("metadata")
            .context("object has no metadata")?;
        let metadata = ObjectMeta::deserialize(metadata).context("invalid object metadata")?;

        let namespace = metadata.namespace.clone().unwrap_or_default();
        let name = metadata.name.clone().unwrap_or_default();
        row.id = fqn(&namespace, &name);
        row.fields.clear();
        if !is_cluster_scoped(ns) {
            row.fields.push(namespace);
        }
        row.fields.extend([
            name,
            map_to_str(metadata.labels.as_ref()),
            String::new(),
            human_age(metadata.creation_timestamp.as_ref()),
        ]);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Generic;
    use crate::model::Row;
    use crate::render::Renderer;
    use serde_json::json;

    #[test]
    fn renders_namespaced_metadata() {
        let object = json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "fred", "namespace": "blee", "labels": {"a": "b"}}
        });
        let mut row = Row::default();
        Generic.render(&object, "blee", &mut row).unwrap();
        assert_eq!(row.id, "blee/fred");
        assert_eq!(row.fields, vec!["blee", "fred", "a=b", "", "<unknown>"]);
        assert_eq!(row.fields.len(), Generic.header("blee").len());
    }

    #[test]
    fn cluster_scope_drops_namespace() {
        let object = json!({"kind": "Thing", "metadata": {"name": "fred"}});
        let mut row = Row::default();
        Generic.render(&object, "-", &mut row).unwrap();
        assert_eq!(row.id, "fred");
        assert_eq!(Generic.header("-").column_names(true)[0], "NAME");
        assert_eq!(row.fields.len(), Generic.header("-").len());
    }

    #[test]
    fn objects_without_metadata_fail() {
        let mut row = Row::default();
        assert!(Generic.render(&json!({"kind": "Thing"}), "", &mut row).is_err());
    }
}
