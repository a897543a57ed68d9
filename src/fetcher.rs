//! The fetch capability and its lightweight HTTP implementation.

use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

/// Fetches a page and returns its HTML, or `None` on any soft failure.
///
/// Implementations never surface errors: timeouts, bad statuses, decode
/// errors and browser crashes are logged and turned into `None`.
#[async_trait]
pub(crate) trait Fetcher: Send + Sync {
    /// `deep` asks for the slower, more patient variant where it applies.
    async fn fetch(&self, url: &str, deep: bool) -> Option<String>;
}

/// Tier 1: a plain GET through a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub(crate) struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Builds the shared client with the configured header set.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let language = HeaderValue::from_str(&config.accept_language).map_err(|e| {
            AppError::Config(format!(
                "Invalid Accept-Language value '{}': {}",
                config.accept_language, e
            ))
        })?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(config.per_host_concurrency)
            .build()?;

        Ok(Self {
            client,
            timeout: config.request_timeout,
        })
    }

    async fn try_fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(target: "fetch_task", "GET {} status: {}", url, status);
        if status != StatusCode::OK {
            return Err(AppError::Status {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _deep: bool) -> Option<String> {
        let start_time = Instant::now();
        match self.try_fetch(url).await {
            Ok(body) => {
                tracing::debug!(target: "fetch_task",
                    "Fetched {} ({} bytes) in {:.2?}", url, body.len(), start_time.elapsed()
                );
                Some(body)
            }
            Err(AppError::Request(e)) if e.is_timeout() => {
                tracing::warn!(target: "fetch_task", "Timeout fetching {}: {}", url, e);
                None
            }
            Err(AppError::Request(e)) if e.is_connect() || e.is_request() => {
                tracing::debug!(target: "fetch_task", "Request/Connection error fetching {}: {}", url, e);
                None
            }
            Err(AppError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                tracing::debug!(target: "fetch_task", "Page not found (404): {}", url);
                None
            }
            Err(e) => {
                tracing::warn!(target: "fetch_task", "Soft failure fetching {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        Config {
            request_timeout: Duration::from_secs(2),
            user_agent: "contact-sleuth-test".to_string(),
            accept_language: "de-DE".to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body_on_200_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .and(header("user-agent", "contact-sleuth-test"))
            .and(header("accept-language", "de-DE"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi@example.com</p>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let body = fetcher
            .fetch(&format!("{}/contact", server.uri()), false)
            .await;
        assert_eq!(body.as_deref(), Some("<p>hi@example.com</p>"));
    }

    #[tokio::test]
    async fn test_non_200_is_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        assert!(fetcher.fetch(&format!("{}/missing", server.uri()), false).await.is_none());
        assert!(fetcher.fetch(&format!("{}/moved", server.uri()), false).await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = Config {
            request_timeout: Duration::from_millis(200),
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert!(fetcher.fetch(&server.uri(), false).await.is_none());
    }

    #[tokio::test]
    async fn test_connection_error_is_soft_failure() {
        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        assert!(fetcher.fetch("http://127.0.0.1:9/", false).await.is_none());
    }

    #[test]
    fn test_invalid_accept_language_is_config_error() {
        let config = Config {
            accept_language: "bad\nvalue".to_string(),
            ..test_config()
        };
        assert!(matches!(
            HttpFetcher::new(&config),
            Err(AppError::Config(_))
        ));
    }
}
