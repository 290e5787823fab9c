//! Shared table of in-flight conversion tasks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use super::job::{ConversionRequest, TaskId, TaskStatus};
use super::probe::MediaInfo;

/// Registry entry for one task.
#[derive(Debug)]
pub struct TaskRecord {
    pub request: ConversionRequest,
    pub status: TaskStatus,
    /// Totals resolved during validation
    pub media: Option<MediaInfo>,
    /// Encoder pid while the process is alive
    pid: Option<u32>,
    /// Set once a kill was delivered through [`TaskRegistry::cancel_process`]
    cancel_requested: bool,
    /// Supervising worker thread
    worker: Option<JoinHandle<()>>,
}

/// Point-in-time copy of a task's state (for UI display).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub id: TaskId,
    pub request: ConversionRequest,
    pub status: TaskStatus,
    pub media: Option<MediaInfo>,
    pub pid: Option<u32>,
}

/// Thread-safe map from task id to its live handles.
///
/// Tasks are inserted on submission and removed by their worker once they
/// reach a terminal state.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TaskRecord>> {
        // A panicking worker must not take the whole registry down with it
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly submitted task.
    pub fn insert(&self, id: TaskId, request: ConversionRequest) {
        self.lock().insert(
            id,
            TaskRecord {
                request,
                status: TaskStatus::Pending,
                media: None,
                pid: None,
                cancel_requested: false,
                worker: None,
            },
        );
    }

    /// Store the worker thread handle. Returns `false` (dropping the handle)
    /// when the task already finished and left the registry.
    pub fn attach_worker(&self, id: TaskId, worker: JoinHandle<()>) -> bool {
        match self.lock().get_mut(&id) {
            Some(record) => {
                record.worker = Some(worker);
                true
            }
            None => false,
        }
    }

    pub fn set_status(&self, id: TaskId, status: TaskStatus) {
        if let Some(record) = self.lock().get_mut(&id) {
            if !record.status.is_finished() {
                record.status = status;
            }
        }
    }

    pub fn set_media(&self, id: TaskId, media: MediaInfo) {
        if let Some(record) = self.lock().get_mut(&id) {
            record.media = Some(media);
        }
    }

    /// Record the live encoder pid and mark the task running.
    pub fn attach_process(&self, id: TaskId, pid: u32) {
        if let Some(record) = self.lock().get_mut(&id) {
            record.pid = Some(pid);
            record.status = TaskStatus::Running;
        }
    }

    /// Poll for the encoder's exit while holding the registry lock.
    ///
    /// `try_wait` reaps the process; the pid is forgotten before the lock is
    /// released, so a concurrent cancel never signals a recycled pid. The pid
    /// is also forgotten when polling fails.
    pub fn reap_process<T, E>(
        &self,
        id: TaskId,
        try_wait: impl FnOnce() -> Result<Option<T>, E>,
    ) -> Result<Option<T>, E> {
        let mut tasks = self.lock();
        let exited = try_wait();
        if !matches!(exited, Ok(None)) {
            if let Some(record) = tasks.get_mut(&id) {
                record.pid = None;
            }
        }
        exited
    }

    pub fn process_id(&self, id: TaskId) -> Option<u32> {
        self.lock().get(&id).and_then(|record| record.pid)
    }

    /// Run `kill` on the live pid while holding the registry lock and flag
    /// the task as cancelled when it succeeds.
    ///
    /// Returns `None` when the task is unknown or has no live process.
    pub fn cancel_process<E>(
        &self,
        id: TaskId,
        kill: impl FnOnce(u32) -> Result<(), E>,
    ) -> Option<Result<(), E>> {
        let mut tasks = self.lock();
        let record = tasks.get_mut(&id)?;
        let pid = record.pid?;
        let result = kill(pid);
        if result.is_ok() {
            record.cancel_requested = true;
        }
        Some(result)
    }

    /// Whether a kill was delivered to this task's encoder.
    pub fn cancel_requested(&self, id: TaskId) -> bool {
        self.lock()
            .get(&id)
            .map(|record| record.cancel_requested)
            .unwrap_or(false)
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.lock().get(&id).map(|record| record.status)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Take a task out of the registry.
    pub fn remove(&self, id: TaskId) -> Option<TaskRecord> {
        self.lock().remove(&id)
    }

    /// Take the worker handle of a task, if still registered.
    pub fn take_worker(&self, id: TaskId) -> Option<JoinHandle<()>> {
        self.lock().get_mut(&id).and_then(|record| record.worker.take())
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.lock().keys().copied().collect()
    }

    /// Get all tasks (for UI display).
    pub fn tasks(&self) -> Vec<TaskSummary> {
        self.lock()
            .iter()
            .map(|(id, record)| TaskSummary {
                id: *id,
                request: record.request.clone(),
                status: record.status,
                media: record.media,
                pid: record.pid,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
