//! Request coalescing.
//!
//! Concurrent loads that share a key collapse into a single execution whose
//! result is handed to every caller that attached while it was in flight.
//!
//! The load itself runs on its own tokio task. A caller that gives up (its
//! wait timeout fires, or its future is dropped) only stops waiting; the load
//! keeps going for everyone else and its entry is cleared when it completes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::error::{AppError, AppResult};

type SharedLoad<T> = Shared<BoxFuture<'static, AppResult<T>>>;
type InFlight<T> = Arc<Mutex<HashMap<String, SharedLoad<T>>>>;

pub struct RequestCoalescer<T> {
    name: &'static str,
    in_flight: InFlight<T>,
    wait_timeout: Option<Duration>,
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            wait_timeout: None,
        }
    }

    /// Bounds how long a single caller waits. Expiry yields [`AppError::Cancelled`]
    /// for that caller only.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Runs `loader` unless a load for `key` is already in flight, in which case
    /// the caller attaches to it and receives the same result.
    pub async fn do_once<F, Fut>(&self, key: impl Into<String>, loader: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let key = key.into();
        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!("{}: attaching to in-flight load for {}", self.name, key);
                    existing.clone()
                }
                None => {
                    let shared = self.start(key.clone(), loader());
                    in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };

        match self.wait_timeout {
            Some(timeout) => tokio::time::timeout(timeout, shared)
                .await
                .map_err(|_| AppError::Cancelled)?,
            None => shared.await,
        }
    }

    /// Number of keys currently being loaded.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    // Called with the map locked, so the spawned task cannot clear its entry
    // before it has been inserted.
    fn start<Fut>(&self, key: String, load: Fut) -> SharedLoad<T>
    where
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        let name = self.name;
        let handle = tokio::spawn(async move {
            let _clear = ClearOnDrop { in_flight, key };
            load.await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(AppError::internal(format!("{} load aborted", name), e)),
            }
        }
        .boxed()
        .shared()
    }
}

// 加载结束时移除在途记录，加载 panic 展开时同样执行
struct ClearOnDrop<T> {
    in_flight: InFlight<T>,
    key: String,
}

impl<T> Drop for ClearOnDrop<T> {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

fn lock<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
