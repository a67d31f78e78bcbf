use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::utils::time_utils::{iso_opt, iso_or_now, now_utc};

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum JobType {
    OptionPricing,
    PortfolioOptimization,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const NON_TERMINAL: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Running];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// States a job may be in immediately before entering `self`.
    /// Running → Running is allowed so a redelivered task can re-enter it.
    pub fn legal_predecessors(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[],
            JobStatus::Running => &[JobStatus::Queued, JobStatus::Running],
            JobStatus::Succeeded => &[JobStatus::Running],
            JobStatus::Failed => &[JobStatus::Queued, JobStatus::Running],
            JobStatus::Cancelled => &[JobStatus::Running],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        next.legal_predecessors().contains(&self)
    }
}

/// A unit of asynchronous work as stored in the `jobs` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Snapshot of the client's name at creation time (not kept in sync)
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub portfolio_id: Option<String>,
    #[serde(default)]
    pub portfolio_name: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub product: Option<String>,
    pub algo: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_submitter")]
    pub submitter: String,
    #[serde(with = "iso_or_now", default = "now_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_or_now", default = "now_utc")]
    pub updated_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(with = "iso_opt", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "iso_opt", default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_sec: Option<u64>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_priority() -> String {
    "Normal".to_string()
}

fn default_submitter() -> String {
    "You".to_string()
}

/// A job submission. `type` and `algo` are required; everything else is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub portfolio_id: Option<String>,
    #[serde(rename = "type", default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub algo: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl JobRequest {
    pub fn new(job_type: JobType, product: Option<&str>, algo: &str, params: Value) -> Self {
        Self {
            job_type: Some(job_type),
            product: product.map(str::to_string),
            algo: Some(algo.to_string()),
            params,
            ..Default::default()
        }
    }

    pub fn with_portfolio(mut self, portfolio_id: &str) -> Self {
        self.portfolio_id = Some(portfolio_id.to_string());
        self
    }

    pub fn with_client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }
}

/// Aggregate view served to dashboards
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub recent: Vec<Job>,
    pub running: Vec<Job>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn transition_table_only_moves_forward() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Cancelled));
        for terminal in JobStatus::iter().filter(|s| s.is_terminal()) {
            for next in JobStatus::iter() {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn job_document_reads_leniently() {
        let doc = json!({
            "id": "abc",
            "type": "OptionPricing",
            "algo": "BlackScholes",
            "status": "Running",
            "createdAt": "2024-01-01T00:00:00.000Z",
            "startedAt": "garbage",
            "finishedAt": 17
        });
        let job: Job = serde_json::from_value(doc).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.started_at, None);
        assert_eq!(job.finished_at, None);
        assert_eq!(job.priority, "Normal");
        assert_eq!(job.submitter, "You");
    }

    #[test]
    fn status_strings_match_the_wire_format() {
        assert_eq!(JobStatus::Succeeded.to_string(), "Succeeded");
        assert_eq!("Cancelled".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
        assert_eq!(
            serde_json::to_value(JobType::PortfolioOptimization).unwrap(),
            json!("PortfolioOptimization")
        );
    }
}
