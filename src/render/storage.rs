use super::helpers::{as_status, human_age, map_to_str, missing};
use super::theme::{ColorerFunc, Theme, default_colorer};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row, RowEvent, fqn};
use anyhow::Result;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use ratatui::style::Color;
use serde_json::Value;

const TERMINATING: &str = "Terminating";
const BETA_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

/// Short access mode names, deduplicated in declaration order.
fn access_modes(modes: Option<&Vec<String>>) -> String {
    let mut out: Vec<&str> = Vec::new();
    for mode in modes.into_iter().flatten() {
        let short = match mode.as_str() {
            "ReadWriteOnce" => "RWO",
            "ReadOnlyMany" => "ROX",
            "ReadWriteMany" => "RWX",
            "ReadWriteOncePod" => "RWOP",
            _ => continue,
        };
        if !out.contains(&short) {
            out.push(short);
        }
    }
    out.join(",")
}

pub struct PersistentVolumeRenderer;

impl Renderer for PersistentVolumeRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAME"),
            HeaderColumn::new("CAPACITY").capacity(),
            HeaderColumn::new("ACCESS MODES"),
            HeaderColumn::new("RECLAIM POLICY"),
            HeaderColumn::new("STATUS"),
            HeaderColumn::new("CLAIM"),
            HeaderColumn::new("STORAGECLASS"),
            HeaderColumn::new("REASON"),
            HeaderColumn::new("VOLUMEMODE").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let volume: PersistentVolume = typed(object, "PersistentVolume")?;
        let spec = volume.spec.clone().unwrap_or_default();
        let status = volume.status.clone().unwrap_or_default();
        let phase = volume_phase(&volume);
        let claim = spec
            .claim_ref
            .as_ref()
            .map(|claim| {
                format!(
                    "{}/{}",
                    claim.namespace.clone().unwrap_or_default(),
                    claim.name.clone().unwrap_or_default()
                )
            })
            .unwrap_or_default();
        let class = volume
            .annotations()
            .get(BETA_CLASS_ANNOTATION)
            .cloned()
            .or_else(|| spec.storage_class_name.clone())
            .unwrap_or_default();
        let size = spec
            .capacity
            .as_ref()
            .and_then(|capacity| capacity.get("storage"))
            .map(|quantity| quantity.0.clone())
            .unwrap_or_default();

        row.id = volume.name_any();
        row.fields = vec![
            volume.name_any(),
            size,
            access_modes(spec.access_modes.as_ref()),
            spec.persistent_volume_reclaim_policy.clone().unwrap_or_default(),
            phase.clone(),
            claim,
            class,
            status.reason.clone().unwrap_or_default(),
            missing(spec.volume_mode.clone().unwrap_or_default()),
            map_to_str(volume.metadata.labels.as_ref()),
            as_status(&diagnose_volume(&phase)),
            human_age(volume.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn colorer(&self) -> ColorerFunc {
        volume_colorer
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let volume: PersistentVolume = typed(object, "PersistentVolume")?;
        diagnose_volume(&volume_phase(&volume))
    }
}

fn volume_phase(volume: &PersistentVolume) -> String {
    if volume.metadata.deletion_timestamp.is_some() {
        return TERMINATING.to_string();
    }
    volume
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_default()
}

fn diagnose_volume(phase: &str) -> Result<()> {
    if phase == "Failed" {
        anyhow::bail!("failed to delete or recycle");
    }
    Ok(())
}

fn volume_colorer(theme: &Theme, ns: &str, header: &Header, event: &RowEvent) -> Color {
    let color = default_colorer(theme, ns, header, event);
    let Some(status) = header
        .index_of("STATUS", true)
        .and_then(|index| event.row.fields.get(index))
    else {
        return color;
    };

    match status.trim() {
        "Bound" => theme.std,
        "Available" => Color::Green,
        "Pending" => theme.pending,
        TERMINATING => theme.completed,
        _ => color,
    }
}

pub struct PersistentVolumeClaimRenderer;

impl Renderer for PersistentVolumeClaimRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("STATUS"),
            HeaderColumn::new("VOLUME"),
            HeaderColumn::new("CAPACITY").capacity(),
            HeaderColumn::new("ACCESS MODES"),
            HeaderColumn::new("STORAGECLASS"),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let claim: PersistentVolumeClaim = typed(object, "PersistentVolumeClaim")?;
        let spec = claim.spec.clone().unwrap_or_default();
        let status = claim.status.clone().unwrap_or_default();
        let phase = claim_phase(&claim);
        let bound = phase == "Bound";
        let (capacity, modes) = if bound {
            (
                status
                    .capacity
                    .as_ref()
                    .and_then(|capacity| capacity.get("storage"))
                    .map(|quantity| quantity.0.clone())
                    .unwrap_or_default(),
                access_modes(status.access_modes.as_ref()),
            )
        } else {
            (String::new(), String::new())
        };
        let class = claim
            .annotations()
            .get(BETA_CLASS_ANNOTATION)
            .cloned()
            .or_else(|| spec.storage_class_name.clone())
            .unwrap_or_default();

        let namespace = claim.namespace().unwrap_or_default();
        let name = claim.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            phase.clone(),
            spec.volume_name.clone().unwrap_or_default(),
            capacity,
            modes,
            class,
            map_to_str(claim.metadata.labels.as_ref()),
            as_status(&diagnose_claim(&phase)),
            human_age(claim.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let claim: PersistentVolumeClaim = typed(object, "PersistentVolumeClaim")?;
        diagnose_claim(&claim_phase(&claim))
    }
}

fn claim_phase(claim: &PersistentVolumeClaim) -> String {
    if claim.metadata.deletion_timestamp.is_some() {
        return TERMINATING.to_string();
    }
    claim
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_default()
}

fn diagnose_claim(phase: &str) -> Result<()> {
    if phase != "Bound" {
        anyhow::bail!("claim is {}", missing(phase));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{PersistentVolumeClaimRenderer, PersistentVolumeRenderer, access_modes};
    use crate::model::{ResEvent, Row, RowEvent};
    use crate::render::{Renderer, Theme};
    use ratatui::style::Color;
    use serde_json::json;

    fn field<'a>(renderer: &dyn Renderer, row: &'a Row, name: &str) -> &'a str {
        let index = renderer.header("default").index_of(name, true).unwrap();
        &row.fields[index]
    }

    #[test]
    fn access_modes_are_shortened() {
        let modes = vec![
            "ReadWriteOnce".to_string(),
            "ReadWriteOnce".to_string(),
            "ReadOnlyMany".to_string(),
        ];
        assert_eq!(access_modes(Some(&modes)), "RWO,ROX");
        assert_eq!(access_modes(None), "");
    }

    #[test]
    fn bound_volume() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {"name": "pv-1"},
            "spec": {
                "capacity": {"storage": "10Gi"},
                "accessModes": ["ReadWriteOnce"],
                "persistentVolumeReclaimPolicy": "Delete",
                "storageClassName": "standard",
                "claimRef": {"namespace": "default", "name": "data"}
            },
            "status": {"phase": "Bound"}
        });
        let mut row = Row::default();
        PersistentVolumeRenderer.render(&object, "-", &mut row).unwrap();
        assert_eq!(row.id, "pv-1");
        assert_eq!(row.fields.len(), PersistentVolumeRenderer.header("-").len());
        assert_eq!(field(&PersistentVolumeRenderer, &row, "CAPACITY"), "10Gi");
        assert_eq!(field(&PersistentVolumeRenderer, &row, "CLAIM"), "default/data");
        assert_eq!(field(&PersistentVolumeRenderer, &row, "STORAGECLASS"), "standard");
        assert_eq!(field(&PersistentVolumeRenderer, &row, "VOLUMEMODE"), "<none>");

        let theme = Theme::default();
        let header = PersistentVolumeRenderer.header("-");
        let colorer = PersistentVolumeRenderer.colorer();
        let event = RowEvent::new(ResEvent::Add, row.clone());
        assert_eq!(colorer(&theme, "-", &header, &event), theme.std);

        let status = header.index_of("STATUS", true).unwrap();
        row.fields[status] = "Available".to_string();
        let event = RowEvent::new(ResEvent::Unchanged, row);
        assert_eq!(colorer(&theme, "-", &header, &event), Color::Green);
    }

    #[test]
    fn pending_claim() {
        let object = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data", "namespace": "default"},
            "spec": {"accessModes": ["ReadWriteOnce"], "storageClassName": "fast"},
            "status": {"phase": "Pending"}
        });
        let mut row = Row::default();
        PersistentVolumeClaimRenderer
            .render(&object, "default", &mut row)
            .unwrap();
        assert_eq!(row.id, "default/data");
        assert_eq!(field(&PersistentVolumeClaimRenderer, &row, "CAPACITY"), "");
        assert_eq!(field(&PersistentVolumeClaimRenderer, &row, "VALID"), "claim is Pending");
        assert!(PersistentVolumeClaimRenderer.healthy(&object).is_err());
    }
}
