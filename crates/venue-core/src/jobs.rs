//! Cancellable timer jobs.
//!
//! A [`CancelToken`] is a shared flag backed by `tokio::sync::watch`. A [`JobTable`] keeps
//! at most one live job per resource key; scheduling a new job for a key cancels the old one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `duration` unless cancelled first.
///
/// Returns `true` only when the full duration elapsed and the token is still live on wake.
pub async fn sleep_or_cancel(token: &CancelToken, duration: Duration) -> bool {
    if token.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => !token.is_cancelled(),
    }
}

/// Handle given to the task that runs a scheduled job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: u64,
    pub token: CancelToken,
}

#[derive(Debug)]
struct Job {
    id: u64,
    token: CancelToken,
}

/// One cancellable job per key.
#[derive(Debug)]
pub struct JobTable<K> {
    next_id: u64,
    jobs: HashMap<K, Job>,
}

impl<K: Eq + Hash + Clone + Ord> JobTable<K> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            jobs: HashMap::new(),
        }
    }

    /// Register a new job for `key`, cancelling whatever was scheduled before.
    pub fn replace(&mut self, key: K) -> JobTicket {
        self.next_id += 1;
        let token = CancelToken::new();
        let job = Job {
            id: self.next_id,
            token: token.clone(),
        };
        if let Some(previous) = self.jobs.insert(key, job) {
            previous.token.cancel();
        }
        JobTicket {
            id: self.next_id,
            token,
        }
    }

    /// Cancel and forget the job for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.jobs.remove(key) {
            Some(job) => {
                job.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Called by a finishing job. Removes the entry only if it still belongs to job `id`,
    /// so a superseded job never evicts its replacement.
    pub fn complete(&mut self, key: &K, id: u64) -> bool {
        if self.jobs.get(key).is_some_and(|job| job.id == id) {
            self.jobs.remove(key);
            true
        } else {
            false
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.jobs.len();
        for (_, job) in self.jobs.drain() {
            job.token.cancel();
        }
        count
    }

    pub fn contains(&self, key: &K) -> bool {
        self.jobs.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.jobs.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<K: Eq + Hash + Clone + Ord> Default for JobTable<K> {
    fn default() -> Self {
        Self::new()
    }
}
