use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use crate::data::queue::{SharedReceiver, next_task};

use super::dispatch::Dispatcher;
use super::lifecycle::{JobManager, JobUpdate};
use super::messages::JobTask;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one task to a terminal state. This is the only place an engine
/// outcome becomes a job status.
fn run_task(task: &JobTask, jobs: &JobManager, dispatcher: &Dispatcher, handle: &Handle) {
    match jobs.mark_running(&task.job_id) {
        Ok(true) => {}
        Ok(false) => {
            log::info!("[job {}] skipped, missing or already finished", task.job_id);
            return;
        }
        Err(e) => {
            log::error!("[job {}] could not enter Running: {:#}", task.job_id, e);
            return;
        }
    }

    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handle.block_on(dispatcher.execute(task))));
    let update = match outcome {
        Ok(Ok(result)) => JobUpdate::succeeded(result),
        Ok(Err(e)) => {
            log::warn!("[job {}] failed ({}): {}", task.job_id, e.kind(), e);
            JobUpdate::failed(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("[job {}] engine panicked: {}", task.job_id, message);
            JobUpdate::failed(format!("internal error: {}", message))
        }
    };

    let status = update.status;
    match jobs.transition(&task.job_id, update) {
        Ok(()) => log::info!(
            "[job {}] {} {} in {} ms",
            task.job_id,
            task.algo,
            status.map(|s| s.to_string()).unwrap_or_default(),
            start.elapsed().as_millis()
        ),
        Err(e) => log::error!("[job {}] final transition rejected: {:#}", task.job_id, e),
    }
}

/// Spawns a worker that drains the shared queue until every sender is dropped
pub fn spawn_worker_thread(
    index: usize,
    rx: SharedReceiver,
    jobs: Arc<JobManager>,
    dispatcher: Arc<Dispatcher>,
    handle: Handle,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("quant-worker-{}", index))
        .spawn(move || {
            while let Some(task) = next_task(&rx) {
                run_task(&task, &jobs, &dispatcher, &handle);
            }
            log::debug!("worker {} stopped, queue closed", index);
        })
        .context(format!("Failed to spawn worker {}", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let caught = panic::catch_unwind(|| panic!("lattice exploded")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "lattice exploded");
        let caught = panic::catch_unwind(|| panic!("{} paths", 3)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "3 paths");
    }
}
