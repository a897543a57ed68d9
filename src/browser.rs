//! Tier 2 fetcher: renders pages in a headless Chromium instance.
//!
//! Every call launches its own browser with a throwaway profile and tears it
//! down before returning, so a crashing page can only take itself down.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const READY_STATE_POLL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Launch options shared by every browser instance.
#[derive(Debug, Clone)]
pub(crate) struct BrowserFetcher {
    user_agent: String,
    chrome_path: Option<PathBuf>,
    timeout: Duration,
    deep_timeout: Duration,
}

impl BrowserFetcher {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            chrome_path: config.chrome_path.clone(),
            timeout: config.browser_budget(false),
            deep_timeout: config.browser_budget(true),
        }
    }

    fn budget(&self, deep: bool) -> Duration {
        if deep { self.deep_timeout } else { self.timeout }
    }

    fn profile_dir() -> PathBuf {
        let suffix: u64 = rand::thread_rng().r#gen();
        std::env::temp_dir().join(format!("contact-sleuth-{:016x}", suffix))
    }

    fn launch_config(&self, profile_dir: &Path, budget: Duration) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile_dir)
            .request_timeout(budget)
            .arg("--ignore-certificate-errors")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(ref path) = self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(AppError::Browser)
    }

    /// Launches, navigates, captures and always closes the browser.
    async fn render(&self, url: &str, budget: Duration) -> Result<String> {
        let profile_dir = Self::profile_dir();
        let config = self.launch_config(&profile_dir, budget)?;

        let (mut browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile(&profile_dir).await;
                return Err(e.into());
            }
        };
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(target: "browser_task", "Browser handler event error: {}", e);
                }
            }
        });

        let outcome = tokio::time::timeout(budget, async {
            let page = browser.new_page("about:blank").await?;
            let navigation = page.execute(NavigateParams::new(url)).await?;
            if let Some(error_text) = navigation.result.error_text.as_deref() {
                return Err(AppError::Browser(format!("Navigation to {} failed: {}", url, error_text)));
            }
            wait_for_dom_content(&page).await;
            let html = page.content().await?;
            Ok::<String, AppError>(html)
        })
        .await
        .unwrap_or_else(|_| Err(AppError::Timeout(budget)));

        shutdown(&mut browser, url, SHUTDOWN_GRACE).await;
        handler_task.abort();
        remove_profile(&profile_dir).await;

        outcome
    }
}

/// Script reporting the committed document's state; the initial blank page
/// always reads as still loading.
const READY_STATE_SCRIPT: &str =
    "document.location.href === 'about:blank' ? 'loading' : document.readyState";

/// DOMContentLoaded has fired once the state leaves `loading`.
fn is_dom_ready(state: Option<&str>) -> bool {
    matches!(state, Some("interactive" | "complete"))
}

/// Resolves once the navigated document has fired DOMContentLoaded.
/// Evaluation errors while the document is being committed count as not ready.
async fn wait_for_dom_content(page: &Page) {
    loop {
        let state = match page.evaluate(READY_STATE_SCRIPT).await {
            Ok(result) => result.into_value::<String>().ok(),
            Err(e) => {
                tracing::trace!(target: "browser_task", "readyState check failed: {}", e);
                None
            }
        };
        if is_dom_ready(state.as_deref()) {
            return;
        }
        tokio::time::sleep(READY_STATE_POLL).await;
    }
}

/// The teardown steps of a launched browser process.
#[async_trait]
trait BrowserProcess: Send {
    async fn close(&mut self) -> Result<()>;
    async fn wait(&mut self) -> Result<()>;
    async fn kill(&mut self) -> Result<()>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn close(&mut self) -> Result<()> {
        Browser::close(self).await?;
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        Browser::wait(self).await?;
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        match Browser::kill(self).await {
            Some(Err(e)) => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Closes the browser and reaps the child. A failed close, or a child that
/// outlives `grace`, is killed.
async fn shutdown<P: BrowserProcess>(process: &mut P, url: &str, grace: Duration) {
    if let Err(e) = process.close().await {
        tracing::debug!(target: "browser_task", "Browser close for {} failed: {}. Killing it.", url, e);
        kill(process, url).await;
    }
    match tokio::time::timeout(grace, process.wait()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(target: "browser_task", "Browser wait for {} failed: {}", url, e);
        }
        Err(_) => {
            tracing::warn!(target: "browser_task",
                "Browser for {} did not exit within {:?}. Killing it.", url, grace
            );
            kill(process, url).await;
        }
    }
}

async fn kill<P: BrowserProcess>(process: &mut P, url: &str) {
    if let Err(e) = process.kill().await {
        tracing::debug!(target: "browser_task", "Browser kill for {} failed: {}", url, e);
    }
}

async fn remove_profile(profile_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(profile_dir).await {
        tracing::trace!(target: "browser_task", "Could not remove profile {}: {}", profile_dir.display(), e);
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, deep: bool) -> Option<String> {
        let budget = self.budget(deep);
        let start_time = Instant::now();
        tracing::debug!(target: "browser_task", "Rendering {} (deep: {}, budget: {:?})", url, deep, budget);

        match self.render(url, budget).await {
            Ok(html) => {
                tracing::debug!(target: "browser_task",
                    "Rendered {} ({} bytes) in {:.2?}", url, html.len(), start_time.elapsed()
                );
                Some(html)
            }
            Err(e) => {
                tracing::warn!(target: "browser_task", "Headless fetch of {} failed: {}", url, e);
                None
            }
        }
    }
}
