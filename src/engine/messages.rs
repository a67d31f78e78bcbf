use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Job, JobType};

/// Unit of work handed to the worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    pub job_id: String,
    pub job_type: JobType,
    pub product: Option<String>,
    pub algo: String,
    /// Params as submitted; parsed into a strict spec by the worker
    pub params: Value,
}

impl JobTask {
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type,
            product: job.product.clone(),
            algo: job.algo.clone(),
            params: job.params.clone(),
        }
    }

    /// Queue task name, one per job family
    pub fn task_name(&self) -> &'static str {
        match self.job_type {
            JobType::OptionPricing => "option_pricing.run_option_job",
            JobType::PortfolioOptimization => "optimization.run_optimization_job",
        }
    }
}
