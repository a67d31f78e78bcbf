//! Task queue collaborator.
//!
//! Workers share one receiving end; whichever worker is idle takes the next task.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::engine::messages::JobTask;

pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task_name: &str, task: JobTask) -> Result<()>;
}

/// Receiving end shared by the worker pool
pub type SharedReceiver = Arc<Mutex<Receiver<JobTask>>>;

/// In-process queue over a std mpsc channel
pub struct ChannelQueue {
    tx: Mutex<Sender<JobTask>>,
}

impl ChannelQueue {
    pub fn new() -> (Self, SharedReceiver) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, Arc::new(Mutex::new(rx)))
    }
}

impl TaskQueue for ChannelQueue {
    fn enqueue(&self, task_name: &str, task: JobTask) -> Result<()> {
        log::debug!("enqueue {} for job {}", task_name, task.job_id);
        let tx = self.tx.lock().map_err(|_| anyhow!("task queue lock poisoned"))?;
        tx.send(task)
            .map_err(|e| anyhow!("task queue closed, dropped job {}", e.0.job_id))
    }
}

/// Blocks until a task arrives. `None` once every sender is gone.
pub fn next_task(rx: &SharedReceiver) -> Option<JobTask> {
    let guard = rx.lock().ok()?;
    guard.recv().ok()
}
