//! Per-domain processing: protocol fallback, page discovery, retries and the
//! short-circuit on the first page that yields a valid email.

use crate::config::Config;
use crate::discovery::discover_pages;
use crate::domain::{PROTOCOLS, base_url};
use crate::extract::extract_from_html;
use crate::fetcher::Fetcher;
use crate::models::{DomainResult, DomainTask, Harvest, PageCandidate, PageOrigin};
use crate::scheduler::HostLimiter;
use crate::validate::filter_valid;
use std::sync::Arc;
use tokio::time::sleep;

/// Shared state for processing domains: both fetch tiers, the per-host
/// limiter and the run configuration.
pub(crate) struct DomainProcessor {
    light: Arc<dyn Fetcher>,
    heavy: Arc<dyn Fetcher>,
    limiter: HostLimiter,
    config: Arc<Config>,
}

impl DomainProcessor {
    pub(crate) fn new(light: Arc<dyn Fetcher>, heavy: Arc<dyn Fetcher>, config: Arc<Config>) -> Self {
        Self {
            light,
            heavy,
            limiter: HostLimiter::new(config.per_host_concurrency),
            config,
        }
    }

    /// Processes a single domain. Never fails: the worst outcome is a
    /// not-found result.
    ///
    /// # Arguments
    /// * `task` - The domain to process.
    /// * `deep` - Use the headless tier for every fetch, discovery included.
    pub(crate) async fn process(&self, task: &DomainTask, deep: bool) -> DomainResult {
        let task_id = format!("#{} {}", task.index, task.hostname);
        tracing::info!(target: "domain_task", "[{}] Starting processing (deep: {}).", task_id, deep);

        for protocol in PROTOCOLS {
            let harvest = self.try_protocol(&task_id, &base_url(protocol, &task.hostname), deep).await;
            if let Harvest::Found { ref page, ref emails } = harvest {
                tracing::info!(target: "domain_task",
                    "[{}] ✓ Found {} email(s) on {}", task_id, emails.len(), page
                );
                return DomainResult::from_harvest(task, harvest);
            }
            tracing::debug!(target: "domain_task", "[{}] Nothing found over {}.", task_id, protocol);
        }

        tracing::info!(target: "domain_task", "[{}] ✗ No email found.", task_id);
        DomainResult::not_found(task)
    }

    async fn try_protocol(&self, task_id: &str, home_url: &str, deep: bool) -> Harvest {
        self.pace().await;
        let home_body = if deep {
            self.fetch_with(&self.heavy, home_url, true).await
        } else {
            self.fetch_with(&self.light, home_url, false).await
        };

        let pages = discover_pages(home_url, home_body.as_deref(), self.config.max_pages);
        tracing::debug!(target: "domain_task", "[{}] {} candidate pages from {}", task_id, pages.len(), home_url);

        let mut prefetched = home_body;
        for page in &pages {
            let cached = match page.origin {
                PageOrigin::Home => prefetched.take(),
                PageOrigin::Discovered => None,
            };
            let harvest = self.try_page(task_id, page, cached, deep).await;
            if harvest.is_found() {
                return harvest;
            }
        }
        Harvest::NotFound
    }

    /// Up to `max_retries + 1` attempts at one page. Only failed fetches are
    /// retried; a page that loads without emails moves on to the next page.
    async fn try_page(
        &self,
        task_id: &str,
        page: &PageCandidate,
        mut cached: Option<String>,
        deep: bool,
    ) -> Harvest {
        let attempts = self.config.max_retries + 1;
        for attempt in 1..=attempts {
            let body = match cached.take() {
                Some(body) => Some(body),
                None => {
                    self.pace().await;
                    self.fetch_page(&page.url, deep).await
                }
            };

            let Some(body) = body else {
                tracing::debug!(target: "domain_task",
                    "[{}] Attempt {}/{} for {} returned no content.", task_id, attempt, attempts, page.url
                );
                continue;
            };

            let emails = filter_valid(extract_from_html(&body));
            if emails.is_empty() {
                tracing::debug!(target: "domain_task", "[{}] No valid emails on {}", task_id, page.url);
                return Harvest::NotFound;
            }
            return Harvest::Found {
                page: page.url.clone(),
                emails,
            };
        }
        Harvest::NotFound
    }

    /// Tier 2 only in deep mode; otherwise Tier 1 with Tier 2 as fallback.
    async fn fetch_page(&self, url: &str, deep: bool) -> Option<String> {
        if deep {
            return self.fetch_with(&self.heavy, url, true).await;
        }
        match self.fetch_with(&self.light, url, false).await {
            Some(body) => Some(body),
            None => {
                tracing::debug!(target: "domain_task", "Falling back to headless fetch for {}", url);
                self.pace().await;
                self.fetch_with(&self.heavy, url, false).await
            }
        }
    }

    async fn fetch_with(&self, fetcher: &Arc<dyn Fetcher>, url: &str, deep: bool) -> Option<String> {
        let _permit = self.limiter.acquire(url).await;
        fetcher.fetch(url, deep).await
    }

    async fn pace(&self) {
        let delay = self.config.next_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureFetcher, test_config};

    fn task(hostname: &str) -> DomainTask {
        DomainTask {
            index: 1,
            hostname: hostname.to_string(),
        }
    }

    fn processor(light: &Arc<FixtureFetcher>, heavy: &Arc<FixtureFetcher>) -> DomainProcessor {
        DomainProcessor::new(light.clone(), heavy.clone(), Arc::new(test_config()))
    }

    #[tokio::test]
    async fn test_home_page_mailto_short_circuits() {
        let light = Arc::new(
            FixtureFetcher::new()
                .with_page(
                    "https://example.com",
                    r#"<a href="mailto:info@example.com">Mail</a>
                       <footer><a href="/contact">Contact</a></footer>"#,
                )
                .with_page("https://example.com/contact", "<p>other@example.com</p>"),
        );
        let heavy = Arc::new(FixtureFetcher::new());

        let result = processor(&light, &heavy).process(&task("example.com"), false).await;

        assert_eq!(result.emails_field(), "info@example.com");
        assert_eq!(result.target_field(), "https://example.com");
        // Discovery body is reused for the home page; the contact page is never fetched.
        assert_eq!(light.calls_for("https://example.com"), 1);
        assert_eq!(light.calls_for("https://example.com/contact"), 0);
        assert_eq!(heavy.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_first_successful_page_only() {
        let light = Arc::new(
            FixtureFetcher::new()
                .with_page(
                    "https://shop.test",
                    r#"<nav><a href="/about">About</a><a href="/contact">Contact</a><a href="/team">Team</a></nav>"#,
                )
                .with_page("https://shop.test/about", "<p>No addresses here</p>")
                .with_page("https://shop.test/contact", "<p>sales [at] shop [dot] test and info@shop.test</p>")
                .with_page("https://shop.test/team", "<p>ceo@shop.test</p>"),
        );
        let heavy = Arc::new(FixtureFetcher::new());

        let result = processor(&light, &heavy).process(&task("shop.test"), false).await;

        assert_eq!(result.emails_field(), "info@shop.test, sales@shop.test");
        assert_eq!(result.target_field(), "https://shop.test/contact");
        assert_eq!(light.calls_for("https://shop.test/about"), 1);
        assert_eq!(light.calls_for("https://shop.test/team"), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_http_then_not_found() {
        let light = Arc::new(FixtureFetcher::new());
        let heavy = Arc::new(FixtureFetcher::new());

        let result = processor(&light, &heavy).process(&task("nomail.test"), false).await;

        assert_eq!(result.emails_field(), "Not found");
        assert_eq!(result.target_field(), "");
        // Per protocol: one discovery fetch plus three attempts on the home page.
        assert_eq!(light.calls_for("https://nomail.test"), 4);
        assert_eq!(light.calls_for("http://nomail.test"), 4);
        // Each failed light attempt falls back to the headless tier.
        assert_eq!(heavy.calls_for("https://nomail.test"), 3);
        assert_eq!(heavy.calls_for("http://nomail.test"), 3);
    }

    #[tokio::test]
    async fn test_http_used_when_https_fails() {
        let light = Arc::new(
            FixtureFetcher::new().with_page("http://legacy.test", "<p>owner@legacy.test</p>"),
        );
        let heavy = Arc::new(FixtureFetcher::new());

        let result = processor(&light, &heavy).process(&task("legacy.test"), false).await;

        assert_eq!(result.emails_field(), "owner@legacy.test");
        assert_eq!(result.target_field(), "http://legacy.test");
    }

    #[tokio::test]
    async fn test_light_failure_falls_back_to_headless() {
        let light = Arc::new(
            FixtureFetcher::new().with_page(
                "https://spa.test",
                r#"<footer><a href="/contact">Contact</a></footer>"#,
            ),
        );
        let heavy = Arc::new(
            FixtureFetcher::new().with_page("https://spa.test/contact", "<p>hello@spa.test</p>"),
        );

        let result = processor(&light, &heavy).process(&task("spa.test"), false).await;

        assert_eq!(result.emails_field(), "hello@spa.test");
        assert_eq!(result.target_field(), "https://spa.test/contact");
        assert_eq!(light.calls_for("https://spa.test/contact"), 1);
        assert_eq!(heavy.calls_for("https://spa.test/contact"), 1);
        assert_eq!(heavy.deep_calls(), 0);
    }

    #[tokio::test]
    async fn test_headless_fallback_is_paced() {
        let light = Arc::new(
            FixtureFetcher::new().with_page(
                "https://paced.test",
                r#"<footer><a href="/contact">Contact</a></footer>"#,
            ),
        );
        let heavy = Arc::new(
            FixtureFetcher::new().with_page("https://paced.test/contact", "<p>hi@paced.test</p>"),
        );
        let config = Config {
            request_delay: (0.05, 0.05),
            ..test_config()
        };
        let processor = DomainProcessor::new(light.clone(), heavy.clone(), Arc::new(config));

        let start = std::time::Instant::now();
        let result = processor.process(&task("paced.test"), false).await;

        assert_eq!(result.emails_field(), "hi@paced.test");
        // Home fetch, light attempt on /contact and the headless fallback each wait.
        assert!(start.elapsed() >= std::time::Duration::from_millis(140));
    }

    #[tokio::test]
    async fn test_deep_mode_never_uses_light_tier() {
        let light = Arc::new(
            FixtureFetcher::new().with_page("https://js.test", "<p>light@js.test</p>"),
        );
        let heavy = Arc::new(
            FixtureFetcher::new().with_page("https://js.test", "<p>rendered@js.test</p>"),
        );

        let result = processor(&light, &heavy).process(&task("js.test"), true).await;

        assert_eq!(result.emails_field(), "rendered@js.test");
        assert_eq!(light.total_calls(), 0);
        assert_eq!(heavy.calls_for("https://js.test"), 1);
        assert_eq!(heavy.deep_calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_flaky_page() {
        let light = Arc::new(
            FixtureFetcher::new()
                .with_page("https://flaky.test", "<p>retry@flaky.test</p>")
                .failing_first("https://flaky.test", 3),
        );
        let heavy = Arc::new(FixtureFetcher::new());

        let result = processor(&light, &heavy).process(&task("flaky.test"), false).await;

        // Discovery fails, attempt 1 fails, attempt 2 fails, attempt 3 succeeds.
        assert_eq!(result.emails_field(), "retry@flaky.test");
        assert_eq!(light.calls_for("https://flaky.test"), 4);
        assert_eq!(light.calls_for("http://flaky.test"), 0);
    }

    #[tokio::test]
    async fn test_invalid_candidates_do_not_count_as_found() {
        let light = Arc::new(
            FixtureFetcher::new().with_page("https://junk.test", "<p>logo@2x.png, user@localhost and broken@domain.c0m</p>"),
        );
        let heavy = Arc::new(FixtureFetcher::new());

        let result = processor(&light, &heavy).process(&task("junk.test"), false).await;
        assert!(!result.is_found());
    }
}
