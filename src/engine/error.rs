//! Failure taxonomy for job execution.
//!
//! Every engine operation returns `Result<_, JobError>`; the worker turns the
//! error into the job's `Failed` transition. Infrastructure code (stores,
//! codecs, CLI) stays on `anyhow` and converts through [`JobError::Internal`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    /// Missing or malformed parameters, detected before any computation
    #[error("{0}")]
    Validation(String),

    /// No spot, empty option chain, no history for a volatility fallback
    #[error("{ticker}: {reason}")]
    MarketData { ticker: String, reason: String },

    /// Solver failure; the solver's own message is kept verbatim
    #[error("{0}")]
    Numerical(String),

    #[error("Unsupported combination: type={job_type}, product={product}, algo={algo}")]
    Unsupported {
        job_type: String,
        product: String,
        algo: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl JobError {
    pub fn validation(msg: impl Into<String>) -> Self {
        JobError::Validation(msg.into())
    }

    pub fn market(ticker: &str, reason: impl Into<String>) -> Self {
        JobError::MarketData {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }

    /// Short category name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::MarketData { .. } => "market-data",
            JobError::Numerical(_) => "numerical",
            JobError::Unsupported { .. } => "unsupported",
            JobError::Internal(_) => "internal",
        }
    }
}

pub type JobResult<T> = std::result::Result<T, JobError>;
