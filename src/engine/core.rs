use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tokio::runtime::Handle;

use crate::config::{ENGINE, EngineSettings, PERSISTENCE};
use crate::data::artifacts::PathArtifactStore;
use crate::data::blob::BlobStore;
use crate::data::market_data::{CachedMarketData, MarketDataProvider};
use crate::data::queue::{ChannelQueue, TaskQueue};
use crate::data::store::DocumentStore;
use crate::models::{Job, JobRequest, JobStats, PathSubset};

use super::dispatch::Dispatcher;
use super::lifecycle::{JobManager, JobUpdate};
use super::messages::JobTask;
use super::worker;

/// Submission and query facade over the job store, the task queue and the
/// worker pool.
pub struct QuantEngine {
    jobs: Arc<JobManager>,
    artifacts: Arc<PathArtifactStore>,
    queue: Box<dyn TaskQueue>,
    workers: Vec<JoinHandle<()>>,
    settings: EngineSettings,
}

impl QuantEngine {
    /// Wraps `market` in a TTL cache and starts `settings.workers` threads.
    /// Async market calls run on `handle`.
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        market: impl MarketDataProvider + 'static,
        handle: Handle,
    ) -> Result<Self> {
        let jobs = Arc::new(JobManager::new(store));
        let artifacts = Arc::new(PathArtifactStore::new(blobs));
        let market: Arc<dyn MarketDataProvider> =
            Arc::new(CachedMarketData::new(market, settings.market_cache_ttl));
        log::info!(
            "Starting {} workers, market data: {}",
            settings.workers,
            market.signature()
        );
        let dispatcher = Arc::new(Dispatcher::new(jobs.clone(), market, artifacts.clone()));

        let (queue, rx) = ChannelQueue::new();
        let workers = (0..settings.workers.max(1))
            .map(|i| {
                worker::spawn_worker_thread(i, rx.clone(), jobs.clone(), dispatcher.clone(), handle.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            jobs,
            artifacts,
            queue: Box::new(queue),
            workers,
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Creates the job and enqueues its task. A job whose task cannot be
    /// enqueued is failed straight away.
    pub fn submit(&self, request: JobRequest) -> Result<Job> {
        let job = self.jobs.create(request)?;
        let task = JobTask::for_job(&job);
        if let Err(e) = self.queue.enqueue(task.task_name(), task) {
            log::error!("[job {}] enqueue failed: {:#}", job.id, e);
            self.jobs
                .transition(&job.id, JobUpdate::failed(format!("enqueue failed: {}", e)))?;
            return self
                .jobs
                .get(&job.id)?
                .context(format!("job {} vanished after failing", job.id));
        }
        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        self.jobs.get(job_id)
    }

    pub fn list_jobs(&self, client_id: Option<&str>, portfolio_id: Option<&str>) -> Result<Vec<Job>> {
        self.jobs.list(client_id, portfolio_id)
    }

    /// `None` when the job does not exist or saved no paths
    pub fn path_subset(&self, job_id: &str, limit: Option<usize>, stride: usize) -> Result<Option<PathSubset>> {
        if self.jobs.get(job_id)?.is_none() {
            return Ok(None);
        }
        let limit = limit.unwrap_or(PERSISTENCE.artifacts.default_subset_limit);
        self.artifacts.subset_for_job(job_id, limit, stride)
    }

    pub fn stats(&self, n: usize) -> Result<JobStats> {
        self.jobs.stats(n)
    }

    /// Polls until every job is terminal
    pub fn wait_for_terminal(&self, job_ids: &[String], timeout: Duration) -> Result<Vec<Job>> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut finished = Vec::with_capacity(job_ids.len());
            for id in job_ids {
                match self.jobs.get(id)? {
                    Some(job) if job.status.is_terminal() => finished.push(job),
                    Some(_) => break,
                    None => bail!("job {} not found", id),
                }
            }
            if finished.len() == job_ids.len() {
                return Ok(finished);
            }
            if Instant::now() >= deadline {
                bail!(
                    "timed out after {:?} with {} of {} jobs finished",
                    timeout,
                    finished.len(),
                    job_ids.len()
                );
            }
            thread::sleep(Duration::from_millis(ENGINE.poll_interval_ms));
        }
    }

    /// Closes the queue and waits for the workers to drain it
    pub fn shutdown(self) {
        let Self { queue, workers, .. } = self;
        drop(queue);
        for handle in workers {
            if handle.join().is_err() {
                log::error!("a worker thread panicked outside a job");
            }
        }
        log::info!("Engine stopped");
    }
}
