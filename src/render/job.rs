use super::helpers::{as_status, human_age, human_duration, map_to_str, missing};
use super::workload::{containers_summary, selector_to_str};
use super::{Renderer, typed};
use crate::model::{Header, HeaderColumn, MISSING_VALUE, Row, fqn};
use anyhow::Result;
use k8s_openapi::api::batch::v1::{CronJob, Job, JobSpec, JobStatus};
use k8s_openapi::jiff::Timestamp;
use kube::ResourceExt;
use serde_json::Value;

pub struct JobRenderer;

impl Renderer for JobRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("COMPLETIONS"),
            HeaderColumn::new("DURATION"),
            HeaderColumn::new("SELECTOR").wide(),
            HeaderColumn::new("CONTAINERS").wide(),
            HeaderColumn::new("IMAGES").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let job: Job = typed(object, "Job")?;
        let spec = job.spec.clone().unwrap_or_default();
        let status = job.status.clone().unwrap_or_default();
        let (containers, images) = containers_summary(spec.template.spec.as_ref());

        let namespace = job.namespace().unwrap_or_default();
        let name = job.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            completions(&spec, &status),
            duration(&status),
            selector_to_str(spec.selector.as_ref()),
            containers,
            images,
            as_status(&diagnose(&spec, &status)),
            human_age(job.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }

    fn healthy(&self, object: &Value) -> Result<()> {
        let job: Job = typed(object, "Job")?;
        diagnose(
            &job.spec.unwrap_or_default(),
            &job.status.unwrap_or_default(),
        )
    }
}

fn completions(spec: &JobSpec, status: &JobStatus) -> String {
    let succeeded = status.succeeded.unwrap_or(0);
    if let Some(completions) = spec.completions {
        return format!("{succeeded}/{completions}");
    }
    match spec.parallelism {
        Some(parallelism) if parallelism > 1 => format!("{succeeded}/1 of {parallelism}"),
        _ => format!("{succeeded}/1"),
    }
}

fn duration(status: &JobStatus) -> String {
    let Some(start) = status.start_time.as_ref() else {
        return MISSING_VALUE.to_string();
    };
    let end = status
        .completion_time
        .as_ref()
        .map_or_else(|| Timestamp::now().as_second(), |time| time.0.as_second());
    human_duration(end - start.0.as_second())
}

fn diagnose(spec: &JobSpec, status: &JobStatus) -> Result<()> {
    let succeeded = status.succeeded.unwrap_or(0);
    let desired = spec.completions.unwrap_or(1);
    let failed = status.failed.unwrap_or(0);
    if succeeded != desired && failed > 0 {
        anyhow::bail!("{failed} pods failed");
    }
    Ok(())
}

pub struct CronJobRenderer;

impl Renderer for CronJobRenderer {
    fn header(&self, _ns: &str) -> Header {
        Header::new(vec![
            HeaderColumn::new("NAMESPACE"),
            HeaderColumn::new("NAME"),
            HeaderColumn::new("SCHEDULE"),
            HeaderColumn::new("SUSPEND"),
            HeaderColumn::new("ACTIVE").right(),
            HeaderColumn::new("LAST_SCHEDULE").time(),
            HeaderColumn::new("SELECTOR").wide(),
            HeaderColumn::new("CONTAINERS").wide(),
            HeaderColumn::new("IMAGES").wide(),
            HeaderColumn::new("LABELS").wide(),
            HeaderColumn::new("VALID").wide(),
            HeaderColumn::new("AGE").time(),
        ])
    }

    fn render(&self, object: &Value, _ns: &str, row: &mut Row) -> Result<()> {
        let cronjob: CronJob = typed(object, "CronJob")?;
        let spec = cronjob.spec.clone().unwrap_or_default();
        let job_spec = spec.job_template.spec.clone().unwrap_or_default();
        let status = cronjob.status.clone().unwrap_or_default();
        let (containers, images) = containers_summary(job_spec.template.spec.as_ref());
        let last = status
            .last_schedule_time
            .as_ref()
            .map_or_else(|| missing(""), |time| human_age(Some(time)));

        let namespace = cronjob.namespace().unwrap_or_default();
        let name = cronjob.name_any();
        row.id = fqn(&namespace, &name);
        row.fields = vec![
            namespace,
            name,
            spec.schedule.clone(),
            spec.suspend.unwrap_or(false).to_string(),
            status.active.as_ref().map_or(0, Vec::len).to_string(),
            last,
            selector_to_str(job_spec.selector.as_ref()),
            containers,
            images,
            map_to_str(cronjob.metadata.labels.as_ref()),
            String::new(),
            human_age(cronjob.metadata.creation_timestamp.as_ref()),
        ];

        Ok(())
    }
}
