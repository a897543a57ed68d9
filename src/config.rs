//! Defines the configuration settings for the contact-sleuth application.

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line arguments for contact-sleuth
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Discover publicly listed contact emails for a list of domains", long_about = None)]
pub(crate) struct AppArgs {
    /// Path to the input text file, one domain per line
    #[arg(short, long, env = "CONTACT_SLEUTH_INPUT")]
    pub input: Option<PathBuf>,

    /// Path to the output CSV file
    #[arg(short, long, env = "CONTACT_SLEUTH_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Maximum number of domains processed concurrently
    #[arg(short, long, env = "CONTACT_SLEUTH_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Maximum number of concurrent requests against a single host
    #[arg(long, env = "CONTACT_SLEUTH_PER_HOST")]
    pub per_host: Option<usize>,

    /// Extra attempts per page after a failed fetch
    #[arg(long, env = "CONTACT_SLEUTH_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Maximum number of candidate pages per domain and protocol
    #[arg(long, env = "CONTACT_SLEUTH_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "CONTACT_SLEUTH_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Headless browser navigation timeout in seconds (doubled in deep mode)
    #[arg(long, env = "CONTACT_SLEUTH_BROWSER_TIMEOUT")]
    pub browser_timeout: Option<u64>,

    /// Minimum delay before each request (seconds)
    #[arg(long, env = "CONTACT_SLEUTH_MIN_DELAY")]
    pub min_delay: Option<f32>,

    /// Maximum delay before each request (seconds)
    #[arg(long, env = "CONTACT_SLEUTH_MAX_DELAY")]
    pub max_delay: Option<f32>,

    /// User agent string for HTTP requests and the headless browser
    #[arg(long, env = "CONTACT_SLEUTH_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Accept-Language header for HTTP requests
    #[arg(long, env = "CONTACT_SLEUTH_ACCEPT_LANGUAGE")]
    pub accept_language: Option<String>,

    /// Path to a Chrome/Chromium executable
    #[arg(long, env = "CONTACT_SLEUTH_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Path to configuration file (TOML format)
    #[arg(long, env = "CONTACT_SLEUTH_CONFIG")]
    pub config_file: Option<String>,

    /// Keep domains already resolved in an existing output file
    #[arg(long, env = "CONTACT_SLEUTH_RESUME")]
    pub resume: bool,

    /// Skip the second, headless-browser pass
    #[arg(long, env = "CONTACT_SLEUTH_NO_DEEP_RETRY")]
    pub no_deep_retry: bool,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    network: Option<NetworkConfig>,
    crawl: Option<CrawlConfig>,
    browser: Option<BrowserConfig>,
    input_output: Option<InputOutputConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    request_timeout: Option<u64>,
    min_delay: Option<f32>,
    max_delay: Option<f32>,
    user_agent: Option<String>,
    accept_language: Option<String>,
    max_concurrency: Option<usize>,
    per_host_concurrency: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct CrawlConfig {
    max_retries: Option<u32>,
    max_pages: Option<usize>,
    deep_retry: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
struct BrowserConfig {
    timeout: Option<u64>,
    chrome_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
struct InputOutputConfig {
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

/// Application configuration settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Path to the input domain list.
    pub input_file: PathBuf,
    /// Path to the output CSV file.
    pub output_file: PathBuf,
    /// Maximum number of domains processed at once.
    pub max_concurrency: usize,
    /// Maximum number of in-flight requests against one host.
    pub per_host_concurrency: usize,
    /// Extra attempts for a page whose fetch failed.
    pub max_retries: u32,
    /// Cap on candidate pages per domain and protocol, home page included.
    pub max_pages: usize,
    /// Minimum and maximum delay before each request (seconds).
    pub request_delay: (f32, f32),
    /// Timeout for lightweight HTTP requests.
    pub request_timeout: Duration,
    /// Timeout for a headless browser fetch; doubled in deep mode.
    pub browser_timeout: Duration,
    /// User agent string to use for HTTP requests and the browser.
    pub user_agent: String,
    /// Accept-Language header value.
    pub accept_language: String,
    /// Explicit Chrome executable; autodetected when `None`.
    pub chrome_path: Option<PathBuf>,
    /// Whether to run the second, browser-only pass.
    pub deep_retry: bool,
    /// Whether to reuse found rows from an existing output file.
    pub resume: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_file: PathBuf::from("domains.txt"),
            output_file: PathBuf::from("results.csv"),
            max_concurrency: 30,
            per_host_concurrency: 2,
            max_retries: 2,
            max_pages: 10,
            request_delay: (0.5, 0.5),
            request_timeout: Duration::from_secs(60),
            browser_timeout: Duration::from_secs(60),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            chrome_path: None,
            deep_retry: true,
            resume: false,
        }
    }
}

impl Config {
    /// Budget for one browser fetch.
    pub(crate) fn browser_budget(&self, deep: bool) -> Duration {
        if deep {
            self.browser_timeout.saturating_mul(2)
        } else {
            self.browser_timeout
        }
    }

    /// Delay applied before each request.
    pub(crate) fn next_delay(&self) -> Duration {
        use rand::Rng;
        let (min, max) = self.request_delay;
        let duration_secs = if min.partial_cmp(&max) == Some(std::cmp::Ordering::Less) {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };
        Duration::try_from_secs_f32(duration_secs.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config = parse_config_file(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn parse_config_file(content: &str) -> anyhow::Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(min_delay) = network.min_delay {
            config.request_delay.0 = min_delay;
        }
        if let Some(max_delay) = network.max_delay {
            config.request_delay.1 = max_delay;
        }
        if let Some(user_agent) = &network.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(language) = &network.accept_language {
            config.accept_language = language.clone();
        }
        if let Some(concurrency) = network.max_concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(per_host) = network.per_host_concurrency {
            config.per_host_concurrency = per_host;
        }
    }

    if let Some(crawl) = &file_config.crawl {
        if let Some(retries) = crawl.max_retries {
            config.max_retries = retries;
        }
        if let Some(pages) = crawl.max_pages {
            config.max_pages = pages;
        }
        if let Some(deep_retry) = crawl.deep_retry {
            config.deep_retry = deep_retry;
        }
    }

    if let Some(browser) = &file_config.browser {
        if let Some(timeout) = browser.timeout {
            config.browser_timeout = Duration::from_secs(timeout);
        }
        if let Some(path) = &browser.chrome_path {
            config.chrome_path = Some(path.clone());
        }
    }

    if let Some(io_config) = &file_config.input_output {
        if let Some(input) = &io_config.input_file {
            config.input_file = input.clone();
        }
        if let Some(output) = &io_config.output_file {
            config.output_file = output.clone();
        }
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &AppArgs) {
    if let Some(ref input) = args.input {
        config.input_file = input.clone();
    }
    if let Some(ref output) = args.output {
        config.output_file = output.clone();
    }

    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }

    if let Some(per_host) = args.per_host {
        config.per_host_concurrency = per_host;
    }

    if let Some(retries) = args.max_retries {
        config.max_retries = retries;
    }

    if let Some(pages) = args.max_pages {
        config.max_pages = pages;
    }

    if let Some(timeout) = args.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }

    if let Some(timeout) = args.browser_timeout {
        config.browser_timeout = Duration::from_secs(timeout);
    }

    if let Some(min_delay) = args.min_delay {
        config.request_delay.0 = min_delay;
    }

    if let Some(max_delay) = args.max_delay {
        config.request_delay.1 = max_delay;
    }

    if let Some(ref agent) = args.user_agent {
        config.user_agent = agent.clone();
    }

    if let Some(ref language) = args.accept_language {
        config.accept_language = language.clone();
    }

    if let Some(ref path) = args.chrome_path {
        config.chrome_path = Some(path.clone());
    }

    if args.resume {
        config.resume = true;
    }

    if args.no_deep_retry {
        config.deep_retry = false;
    }
}

fn validate_config(config: &mut Config) -> anyhow::Result<()> {
    let (min_delay, max_delay) = config.request_delay;
    if !min_delay.is_finite() || !max_delay.is_finite() {
        anyhow::bail!(
            "Request delay must be a finite number of seconds (got {:?})",
            config.request_delay
        );
    }
    if min_delay < 0.0 || max_delay < 0.0 {
        anyhow::bail!(
            "Request delay must not be negative (got {:?})",
            config.request_delay
        );
    }

    if config.request_delay.0 > config.request_delay.1 {
        config.request_delay.1 = config.request_delay.0;
        tracing::warn!(
            "Min delay was greater than max delay. Setting both to {}",
            config.request_delay.0
        );
    }

    if config.max_concurrency == 0 {
        config.max_concurrency = 1;
        tracing::warn!("Concurrency was set to 0. Setting to 1.");
    }

    if config.per_host_concurrency == 0 {
        config.per_host_concurrency = 1;
        tracing::warn!("Per-host concurrency was set to 0. Setting to 1.");
    }

    if config.max_pages == 0 {
        config.max_pages = 1;
        tracing::warn!("Max pages was set to 0. Setting to 1 (home page only).");
    }

    if config.request_timeout.is_zero() || config.browser_timeout.is_zero() {
        anyhow::bail!("Timeouts must be at least one second");
    }

    Ok(())
}

/// Builds the configuration: defaults, then config file, then CLI/env.
pub(crate) fn build_config(args: &AppArgs) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./contact-sleuth.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);

    validate_config(&mut config)?;

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}
