//! Scripted fetchers and config shared by the unit tests.

use crate::config::Config;
use crate::fetcher::Fetcher;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Config with pacing disabled so tests run instantly.
pub(crate) fn test_config() -> Config {
    Config {
        request_delay: (0.0, 0.0),
        request_timeout: Duration::from_secs(1),
        browser_timeout: Duration::from_secs(1),
        max_concurrency: 8,
        per_host_concurrency: 2,
        max_retries: 2,
        max_pages: 10,
        ..Config::default()
    }
}

/// A `Fetcher` that serves canned pages and records every call.
#[derive(Default)]
pub(crate) struct FixtureFetcher {
    pages: HashMap<String, String>,
    failures_left: Mutex<HashMap<String, usize>>,
    max_delay_ms: u64,
    calls: Mutex<Vec<(String, bool)>>,
}

impl FixtureFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// The first `count` fetches of `url` fail even if a page is registered.
    pub(crate) fn failing_first(self, url: &str, count: usize) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(url.to_string(), count);
        self
    }

    /// Sleeps a random 0..=`max_ms` milliseconds before answering.
    pub(crate) fn with_random_delay(mut self, max_ms: u64) -> Self {
        self.max_delay_ms = max_ms;
        self
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn deep_calls(&self) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, deep)| *deep).count()
    }

    /// Distinct hosts this fetcher was asked about, e.g. `"nomail.test"`.
    pub(crate) fn hosts_called(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| crate::domain::host_key(url))
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, deep: bool) -> Option<String> {
        self.calls.lock().unwrap().push((url.to_string(), deep));

        if self.max_delay_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        {
            let mut failures = self.failures_left.lock().unwrap();
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return None;
                }
            }
        }

        self.pages.get(url).cloned()
    }
}
