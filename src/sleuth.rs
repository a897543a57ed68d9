//! Two-pass orchestration: a fast pass over every domain, then a headless
//! pass over the ones that came back empty.

use crate::browser::BrowserFetcher;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::models::{DomainResult, DomainTask};
use crate::processor::DomainProcessor;
use crate::scheduler::run_pass;
use crate::sink::{ResultSink, load_previous, write_final};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub total: usize,
    pub found: usize,
    pub not_found: usize,
    pub resumed: usize,
    pub recovered_in_deep_pass: usize,
    pub elapsed: Duration,
}

/// Owns the processor and configuration for one run.
pub(crate) struct ContactSleuth {
    processor: Arc<DomainProcessor>,
    config: Arc<Config>,
}

impl ContactSleuth {
    /// Creates a sleuth with the real HTTP and headless-browser tiers.
    pub(crate) fn new(config: Config) -> Result<Self> {
        let light: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config)?);
        let heavy: Arc<dyn Fetcher> = Arc::new(BrowserFetcher::new(&config));
        Ok(Self::with_fetchers(config, light, heavy))
    }

    /// Creates a sleuth around arbitrary fetch tiers.
    pub(crate) fn with_fetchers(config: Config, light: Arc<dyn Fetcher>, heavy: Arc<dyn Fetcher>) -> Self {
        let config = Arc::new(config);
        let processor = Arc::new(DomainProcessor::new(light, heavy, Arc::clone(&config)));
        Self { processor, config }
    }

    /// Runs both passes over `tasks` and writes the final CSV.
    pub(crate) async fn run(&self, tasks: Vec<DomainTask>) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary {
            total: tasks.len(),
            ..RunSummary::default()
        };

        let mut results: BTreeMap<usize, DomainResult> = BTreeMap::new();
        let mut pending = Vec::with_capacity(tasks.len());
        let previous = self.previous_results();
        for task in &tasks {
            match previous.get(&task.hostname) {
                Some((emails, page)) => {
                    results.insert(
                        task.index,
                        DomainResult {
                            index: task.index,
                            hostname: task.hostname.clone(),
                            emails: emails.clone(),
                            source_page: Some(page.clone()),
                        },
                    );
                    summary.resumed += 1;
                }
                None => pending.push(task.clone()),
            }
        }
        if summary.resumed > 0 {
            tracing::info!(target: "sleuth", "Resuming: {} domains already resolved.", summary.resumed);
        }

        let mut sink = ResultSink::with_interim_file(&self.config.output_file)?;
        for carried in results.values() {
            sink.record(carried.clone());
        }
        let first_pass = self.pass(pending.clone(), false, sink, "Pass 1: Processing domains").await;
        results.extend(first_pass);

        if self.config.deep_retry {
            let retry: Vec<DomainTask> = pending
                .iter()
                .filter(|task| !results.get(&task.index).is_some_and(DomainResult::is_found))
                .cloned()
                .collect();
            if !retry.is_empty() {
                tracing::info!(target: "sleuth",
                    "Retrying {} domains with deep mode (headless browser)...", retry.len()
                );
                let deep_pass = self
                    .pass(retry, true, ResultSink::in_memory(), "Pass 2: Deep retry")
                    .await;
                for (index, deep_result) in deep_pass {
                    if deep_result.is_found() {
                        summary.recovered_in_deep_pass += 1;
                        results.insert(index, deep_result);
                    }
                }
            }
        }

        for task in &tasks {
            results
                .entry(task.index)
                .or_insert_with(|| DomainResult::not_found(task));
        }

        write_final(&self.config.output_file, &results)?;

        summary.found = results.values().filter(|r| r.is_found()).count();
        summary.not_found = results.len() - summary.found;
        summary.elapsed = start_time.elapsed();
        Ok(summary)
    }

    async fn pass(
        &self,
        tasks: Vec<DomainTask>,
        deep: bool,
        sink: ResultSink,
        label: &'static str,
    ) -> BTreeMap<usize, DomainResult> {
        let (sender, receiver) = mpsc::channel(self.config.max_concurrency.max(1) * 2);
        let progress = progress_bar(tasks.len(), label);
        let writer = tokio::spawn(sink.drain(receiver, progress));

        let delivered = run_pass(
            Arc::clone(&self.processor),
            tasks,
            deep,
            self.config.max_concurrency,
            sender,
        )
        .await;
        tracing::debug!(target: "sleuth", "{}: {} results delivered", label, delivered);

        match writer.await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(target: "sleuth", "{}: result writer failed: {}", label, e);
                BTreeMap::new()
            }
        }
    }

    fn previous_results(&self) -> HashMap<String, (BTreeSet<String>, String)> {
        if !self.config.resume || !self.config.output_file.exists() {
            return HashMap::new();
        }
        match load_previous(&self.config.output_file) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(target: "sleuth",
                    "Could not read previous results from {}: {}. Starting fresh.",
                    self.config.output_file.display(), e
                );
                HashMap::new()
            }
        }
    }
}

fn progress_bar(len: usize, label: &'static str) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    match ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        Ok(style) => progress.set_style(style.progress_chars("##-")),
        Err(e) => tracing::debug!(target: "sleuth", "Progress bar template rejected: {}", e),
    }
    progress.set_prefix(label);
    progress
}
