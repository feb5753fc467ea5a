use super::helpers::{human_age, human_age_timestamp, map_to_str, missing};
use super::theme::{ColorerFunc, Theme, default_colorer};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, Row, RowEvent, fqn};
use anyhow::Result;
use k8s_openapi::api::core::v1::Event;
use kube::ResourceExt;
use ratatui::style::Color;
use serde_json::Value;

pub struct EventRenderer;

impl Renderer for EventRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME").hidden(),
            HeaderColumn::new("LAST SEEN").time(),
            HeaderColumn::new("TYPE"),
            HeaderColumn::new("REASON"),
            HeaderColumn::new("OBJECT"),
            HeaderColumn::new("COUNT").right(),
            HeaderColumn::new("MESSAGE"),
            HeaderColumn::new("SOURCE").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let event: Event = typed(object, "Event")?;
        let involved = &event.involved_object;
        let target = format!(
            "{}/{}",
            involved.kind.clone().unwrap_or_default().to_lowercase(),
            involved.name.clone().unwrap_or_default()
        );
        let source = event
            .source
            .as_ref()
            .and_then(|source| source.component.clone())
            .unwrap_or_default();

        let namespace = event.namespace().unwrap_or_default();
        let name = event.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            last_seen(&event),
            event.type_.clone().unwrap_or_default(),
            event.reason.clone().unwrap_or_default(),
            target,
            event.count.unwrap_or(1).to_string(),
            event.message.clone().unwrap_or_default().trim().to_string(),
            missing(source),
            map_to_str(event.metadata.labels.as_ref()),
            String::new(),
            human_age(event.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn colorer(&self) -> ColorerFunc {
        event_colorer
    }
}

fn last_seen(event: &Event) -> String {
    if let Some(last) = event.last_timestamp.as_ref() {
        return human_age(Some(last));
    }
    if let Some(time) = event.event_time.as_ref() {
        return human_age_timestamp(time.0);
    }
    if let Some(first) = event.first_timestamp.as_ref() {
        return human_age(Some(first));
    }
    human_age(event.metadata.creation_timestamp.as_ref())
}

fn event_colorer(theme: &Theme, ns: &str, header: &Header, event: &RowEvent) -> Color {
    let warning = header
        .index_of("TYPE", true)
        .and_then(|index| event.row.fields.get(index))
        .is_some_and(|kind| kind == "Warning");
    if warning {
        return theme.error;
    }
    default_colorer(theme, ns, header, event)
}
