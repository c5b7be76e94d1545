//! Bounded background work queue
//!
//! Cache warm-up and read-triggered purges run here instead of as detached
//! spawns. A semaphore caps how many run at once, and every task's outcome
//! is kept until someone calls [`BackgroundQueue::drain`].

use crate::error::Result;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Finished outcomes kept between drains
const COMPLETED_CAPACITY: usize = 1_024;

/// Result of one background task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub id: Uuid,
    pub label: String,
    pub result: std::result::Result<(), String>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Semaphore-bounded task queue with observable outcomes
pub struct BackgroundQueue {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    tasks: Mutex<JoinSet<TaskOutcome>>,
    completed: Mutex<VecDeque<TaskOutcome>>,
}

impl BackgroundQueue {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            tasks: Mutex::new(JoinSet::new()),
            completed: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Queue `task`; it starts once a permit is free. Must be called inside a tokio runtime.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> Uuid
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let label = label.into();
        let permits = self.permits.clone();
        debug!(task_id = %id, label = %label, "Queued background task");

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        self.reap(&mut tasks);
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => task.await.map_err(|e| e.to_string()),
                Err(_) => Err("background queue closed".to_string()),
            };
            if let Err(e) = &result {
                warn!(task_id = %id, label = %label, "Background task failed: {}", e);
            }
            TaskOutcome { id, label, result }
        });
        id
    }

    /// Tasks submitted but not yet collected
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Wait for every queued task and return all outcomes since the last drain
    pub async fn drain(&self) -> Vec<TaskOutcome> {
        let mut set = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|p| p.into_inner()));
        let mut outcomes: Vec<TaskOutcome> = self
            .completed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();

        while let Some(joined) = set.join_next().await {
            outcomes.push(outcome_of(joined));
        }
        outcomes
    }

    /// Stop accepting new work; queued tasks that have not started fail
    pub fn close(&self) {
        self.permits.close();
    }

    fn reap(&self, tasks: &mut JoinSet<TaskOutcome>) {
        let mut completed = self.completed.lock().unwrap_or_else(|p| p.into_inner());
        while let Some(joined) = tasks.try_join_next() {
            if completed.len() >= COMPLETED_CAPACITY {
                completed.pop_front();
            }
            completed.push_back(outcome_of(joined));
        }
    }
}

impl Default for BackgroundQueue {
    fn default() -> Self {
        Self::new(8)
    }
}

fn outcome_of(joined: std::result::Result<TaskOutcome, tokio::task::JoinError>) -> TaskOutcome {
    joined.unwrap_or_else(|e| {
        warn!("Background task aborted: {}", e);
        TaskOutcome {
            id: Uuid::nil(),
            label: "aborted".to_string(),
            result: Err(e.to_string()),
        }
    })
}
