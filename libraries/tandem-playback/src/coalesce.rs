//! Request coalescing
//!
//! Concurrent lookups for the same key share one spawned task. The task keeps
//! running when every caller goes away, so a late result still reaches the
//! cache.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Pending<T> = Shared<BoxFuture<'static, T>>;

pub(crate) struct InFlight<T> {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<String, (u64, Pending<T>)>>>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the in-flight request for `key`, or start one with `start`.
    ///
    /// `recover` turns a panicked or cancelled task into a value.
    pub fn join_or_start<F>(
        &self,
        key: &str,
        start: impl FnOnce() -> F,
        recover: fn(String) -> T,
    ) -> Pending<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some((_, shared)) = pending.get(key) {
            return shared.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let work = start();
        let registry = Arc::clone(&self.pending);
        let owned_key = key.to_string();

        let task = tokio::spawn(async move {
            let output = work.await;
            let mut pending = registry.lock();
            if pending.get(&owned_key).is_some_and(|(owner, _)| *owner == id) {
                pending.remove(&owned_key);
            }
            output
        });

        let shared = async move {
            match task.await {
                Ok(output) => output,
                Err(e) => recover(e.to_string()),
            }
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), (id, shared.clone()));
        shared
    }

    /// Forget all in-flight requests; their tasks finish on their own
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
