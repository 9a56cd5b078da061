//! Registry for detached work such as session refreshes and cache population.
//!
//! Tasks are never awaited by the code that submits them. Each one runs under
//! its own timeout and panic guard, and failures only reach the log.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::AppResult;

#[derive(Clone)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

struct Inner {
    tasks: Mutex<JoinSet<()>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    task_timeout: Duration,
}

impl BackgroundTasks {
    /// `max_tasks` bounds how many tasks may be outstanding at once.
    pub fn new(max_tasks: usize, task_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(JoinSet::new()),
                permits: Arc::new(Semaphore::new(max_tasks)),
                closed: AtomicBool::new(false),
                task_timeout,
            }),
        }
    }

    /// Submits `task` and returns immediately. Returns `false` when the task was
    /// dropped because the registry is shutting down or already full.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            debug!("Background registry closed, dropping {}", name);
            return false;
        }

        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Background registry full, dropping {}", name);
                return false;
            }
        };

        let timeout = self.inner.task_timeout;
        let mut tasks = self.tasks();
        // shutdown flips `closed` under this lock; seen here, the set is no longer drained
        if self.inner.closed.load(Ordering::Acquire) {
            debug!("Background registry closed, dropping {}", name);
            return false;
        }
        // reap finished tasks so the set does not grow without bound
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let _permit = permit;
            match tokio::time::timeout(timeout, AssertUnwindSafe(task).catch_unwind()).await {
                Ok(Ok(Ok(()))) => debug!("Background task {} finished", name),
                Ok(Ok(Err(e))) => warn!("Background task {} failed: {}", name, e),
                Ok(Err(panic)) => error!("Background task {} panicked: {}", name, panic_message(&panic)),
                Err(_) => warn!("Background task {} timed out after {:?}", name, timeout),
            }
        });
        true
    }

    /// Number of tasks currently holding a slot.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Stops accepting work, waits up to `grace` for outstanding tasks and aborts
    /// whatever is still running afterwards. Returns how many tasks were aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let mut tasks = {
            let mut guard = self.tasks();
            self.inner.closed.store(true, Ordering::Release);
            std::mem::take(&mut *guard)
        };

        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_ok() {
            return 0;
        }

        let remaining = tasks.len();
        warn!("Aborting {} background tasks after {:?} grace period", remaining, grace);
        tasks.shutdown().await;
        remaining
    }

    /// Waits until every submitted task has completed, without closing the registry.
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks());
            if tasks.is_empty() {
                return;
            }
            while tasks.join_next().await.is_some() {}
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
