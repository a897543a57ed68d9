//! Runs one domain processor per task under global and per-host limits.

use crate::domain::host_key;
use crate::models::{DomainResult, DomainTask};
use crate::processor::DomainProcessor;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};

/// Caps the number of in-flight requests against any single host.
#[derive(Debug)]
pub(crate) struct HostLimiter {
    per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub(crate) fn new(per_host: usize) -> Self {
        Self {
            per_host: per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)))
            .clone()
    }

    /// Waits for a request slot on the host of `url`. The slot is released
    /// when the returned permit is dropped.
    pub(crate) async fn acquire(&self, url: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = self.semaphore_for(&host_key(url));
        semaphore.acquire_owned().await.ok()
    }
}

/// Processes `tasks` concurrently and sends each result to `results`.
///
/// At most `max_concurrency` domains are in flight. Results are sent in
/// completion order; the receiver is responsible for ordering. A task that
/// panics is logged and produces no message.
///
/// # Returns
/// * The number of tasks that completed and delivered a result.
pub(crate) async fn run_pass(
    processor: Arc<DomainProcessor>,
    tasks: Vec<DomainTask>,
    deep: bool,
    max_concurrency: usize,
    results: mpsc::Sender<DomainResult>,
) -> usize {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut handles = FuturesUnordered::new();

    tracing::info!(target: "scheduler",
        "Scheduling {} domains (deep: {}, concurrency: {})", tasks.len(), deep, max_concurrency
    );

    for task in tasks {
        let processor = Arc::clone(&processor);
        let semaphore = Arc::clone(&semaphore);
        let results = results.clone();
        let index = task.index;

        let handle = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return false;
            };
            let result = processor.process(&task, deep).await;
            if results.send(result).await.is_err() {
                tracing::error!(target: "scheduler", "Result channel closed before domain #{} was recorded", task.index);
                return false;
            }
            true
        });
        handles.push(async move { (index, handle.await) });
    }
    drop(results);

    let mut delivered = 0;
    while let Some((index, joined)) = handles.next().await {
        match joined {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(target: "scheduler", "Processing task for domain #{} failed to join: {}", index, e);
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_host_limiter_caps_per_host() {
        let limiter = HostLimiter::new(2);
        let first = limiter.acquire("https://example.com/a").await;
        let second = limiter.acquire("http://www.example.com/b").await;
        assert!(first.is_some() && second.is_some());

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire("https://example.com/c")).await;
        assert!(blocked.is_err(), "third request to the same host must wait");

        let other_host =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire("https://other.test/")).await;
        assert!(other_host.is_ok(), "other hosts are not affected");

        drop(first);
        let unblocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire("https://example.com/c")).await;
        assert!(unblocked.is_ok());
    }
}
