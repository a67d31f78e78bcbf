//! Job lifecycle over the `jobs` collection.
//!
//! Every write is a field-level merge whose filter carries the legal
//! predecessor statuses, so the status check and the write happen in one
//! store call.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::config::{DEBUG_FLAGS, PERSISTENCE};
use crate::data::store::{DocumentStore, Filter, Sort};
use crate::models::{Job, JobRequest, JobStats, JobStatus};
use crate::utils::time_utils::{elapsed_secs, now_utc, parse_iso, to_iso};
use crate::utils::{Payload, sanitize};

pub const JOBS: &str = "jobs";
pub const CLIENTS: &str = "clients";
pub const PORTFOLIOS: &str = "portfolios";
pub const ASSETS: &str = "assets";

/// A requested change. Without a status it is a progress update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub result: Option<Payload>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn succeeded(result: Payload) -> Self {
        Self {
            status: Some(JobStatus::Succeeded),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn progress(result: Payload) -> Self {
        Self {
            status: None,
            result: Some(result),
            error: None,
        }
    }
}

fn status_value(status: JobStatus) -> Value {
    Value::String(status.as_ref().to_string())
}

pub struct JobManager {
    store: Arc<dyn DocumentStore>,
}

impl JobManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn name_of(&self, collection: &str, id: Option<&String>) -> Result<Option<String>> {
        let Some(id) = id else {
            return Ok(None);
        };
        let doc = self.store.find_one(collection, &Filter::by_id(id))?;
        Ok(doc
            .as_ref()
            .and_then(|d| d.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Inserts a new `Queued` job. Client and portfolio names are copied
    /// from their collections as they are right now.
    pub fn create(&self, request: JobRequest) -> Result<Job> {
        let job_type = request.job_type.ok_or_else(|| anyhow!("type is required"))?;
        let algo = request
            .algo
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| anyhow!("algo is required"))?;

        let id = match request.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                if self.store.find_one(JOBS, &Filter::by_id(&id))?.is_some() {
                    bail!("job {} already exists", id);
                }
                id
            }
            None => Uuid::new_v4().simple().to_string(),
        };

        let now = now_utc();
        let job = Job {
            id,
            client_name: self.name_of(CLIENTS, request.client_id.as_ref())?,
            client_id: request.client_id,
            portfolio_name: self.name_of(PORTFOLIOS, request.portfolio_id.as_ref())?,
            portfolio_id: request.portfolio_id,
            job_type,
            product: request.product,
            algo,
            priority: request.priority.unwrap_or_else(|| "Normal".to_string()),
            submitter: request.submitter.unwrap_or_else(|| "You".to_string()),
            created_at: now,
            updated_at: now,
            status: JobStatus::Queued,
            started_at: None,
            finished_at: None,
            duration_sec: None,
            params: request.params,
            result: None,
            error: None,
        };

        let doc = serde_json::to_value(&job).context("serialize job")?;
        self.store
            .insert(JOBS, doc)
            .context(format!("insert job {}", job.id))?;
        if DEBUG_FLAGS.print_job_transitions {
            log::info!("[job {}] created {} {}", job.id, job.job_type, job.algo);
        }
        Ok(job)
    }

    /// `startedAt` if set, else `createdAt`, else now. Unparsable stored
    /// timestamps and a missing document both fall back to now.
    fn duration_base(&self, job_id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let doc = self.store.find_one(JOBS, &Filter::by_id(job_id))?;
        let field = |name: &str| {
            doc.as_ref()
                .and_then(|d| d.get(name))
                .filter(|v| !v.is_null())
                .cloned()
        };
        Ok(match field("startedAt").or_else(|| field("createdAt")) {
            Some(v) => v.as_str().and_then(parse_iso).unwrap_or(now),
            None => now,
        })
    }

    fn describe_rejection(&self, job_id: &str, next: JobStatus) -> Result<anyhow::Error> {
        let current = self
            .store
            .find_one(JOBS, &Filter::by_id(job_id))?
            .and_then(|d| d.get("status").and_then(Value::as_str).map(str::to_string));
        Ok(match current {
            Some(current) => anyhow!("illegal transition for job {}: {} -> {}", job_id, current, next),
            None => anyhow!("job {} not found", job_id),
        })
    }

    pub fn transition(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        let now = now_utc();
        let mut fields = Map::new();
        fields.insert("updatedAt".into(), Value::String(to_iso(&now)));

        let Some(status) = update.status else {
            // Progress only lands on a job that is still moving
            if let Some(result) = &update.result {
                fields.insert("result".into(), sanitize(result));
            }
            if let Some(error) = update.error {
                fields.insert("error".into(), Value::String(error));
            }
            let filter = Filter::by_id(job_id).is_in("status", JobStatus::NON_TERMINAL.map(status_value));
            let matched = self.store.update_one(JOBS, &filter, fields)?;
            if !matched {
                log::debug!("progress for job {} ignored, job finished or missing", job_id);
            }
            return Ok(());
        };

        let predecessors = status.legal_predecessors();
        if predecessors.is_empty() {
            bail!("job {} cannot move back to {}", job_id, status);
        }
        let filter = Filter::by_id(job_id).is_in("status", predecessors.iter().map(|s| status_value(*s)));
        fields.insert("status".into(), status_value(status));

        let matched = if status.is_terminal() {
            let base = self.duration_base(job_id, now)?;
            fields.insert("finishedAt".into(), Value::String(to_iso(&now)));
            fields.insert("durationSec".into(), Value::from(elapsed_secs(base, now)));
            fields.insert(
                "result".into(),
                update.result.as_ref().map_or(Value::Null, sanitize),
            );
            fields.insert(
                "error".into(),
                update.error.map_or(Value::Null, Value::String),
            );
            self.store.update_one(JOBS, &filter, fields)?
        } else {
            if let Some(result) = &update.result {
                fields.insert("result".into(), sanitize(result));
            }
            // Only the first entry into Running stamps startedAt
            let mut first_entry = fields.clone();
            first_entry.insert("startedAt".into(), Value::String(to_iso(&now)));
            self.store
                .update_one(JOBS, &filter.clone().is_null("startedAt"), first_entry)?
                || self.store.update_one(JOBS, &filter, fields)?
        };

        if !matched {
            return Err(self.describe_rejection(job_id, status)?);
        }
        if DEBUG_FLAGS.print_job_transitions {
            log::info!("[job {}] -> {}", job_id, status);
        }
        Ok(())
    }

    /// Moves a job into `Running`. `false` when the job is missing or
    /// already finished, which a redelivered task should treat as "skip".
    pub fn mark_running(&self, job_id: &str) -> Result<bool> {
        match self.get(job_id)? {
            Some(job) if !job.status.is_terminal() => {
                self.transition(job_id, JobUpdate::status(JobStatus::Running))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn get(&self, job_id: &str) -> Result<Option<Job>> {
        self.store
            .find_one(JOBS, &Filter::by_id(job_id))?
            .map(|doc| serde_json::from_value(doc).context(format!("decode job {}", job_id)))
            .transpose()
    }

    fn decode_all(docs: Vec<Value>) -> Result<Vec<Job>> {
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).context("decode job"))
            .collect()
    }

    /// Newest first, capped at the list limit
    pub fn list(&self, client_id: Option<&str>, portfolio_id: Option<&str>) -> Result<Vec<Job>> {
        let mut filter = Filter::new();
        if let Some(client_id) = client_id {
            filter = filter.eq("clientId", client_id);
        }
        if let Some(portfolio_id) = portfolio_id {
            filter = filter.eq("portfolioId", portfolio_id);
        }
        let docs = self.store.find(
            JOBS,
            &filter,
            Some(&Sort::desc("createdAt")),
            Some(PERSISTENCE.list_limit),
        )?;
        Self::decode_all(docs)
    }

    pub fn stats(&self, n: usize) -> Result<JobStats> {
        let all = Filter::new();
        let total = self.store.count(JOBS, &all)?;
        let mut by_status = std::collections::BTreeMap::new();
        for status in JobStatus::iter() {
            let count = self
                .store
                .count(JOBS, &Filter::new().eq("status", status_value(status)))?;
            by_status.insert(status.to_string(), count);
        }
        let recent = self
            .store
            .find(JOBS, &all, Some(&Sort::desc("createdAt")), Some(n))?;
        let running = self.store.find(
            JOBS,
            &Filter::new().eq("status", status_value(JobStatus::Running)),
            Some(&Sort::desc("updatedAt")),
            Some(n),
        )?;
        Ok(JobStats {
            total,
            by_status,
            recent: Self::decode_all(recent)?,
            running: Self::decode_all(running)?,
        })
    }
}
