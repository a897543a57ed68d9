use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod browser;
mod config;
mod discovery;
mod domain;
mod error;
mod extract;
mod fetcher;
mod models;
mod processor;
mod scheduler;
mod sink;
mod sleuth;
#[cfg(test)]
mod testing;
mod validate;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = config::AppArgs::parse();
    let config = config::build_config(&args)?;

    info!("Loading domains from {}", config.input_file.display());
    let tasks = domain::load_domains(&config.input_file).with_context(|| {
        format!(
            "Failed to read input file '{}'",
            config.input_file.display()
        )
    })?;

    if tasks.is_empty() {
        tracing::warn!("No domains found in input file. Output will contain only the header.");
    }
    info!(
        "Loaded {} domains. Writing results to {} (Concurrency: {}, per host: {})",
        tasks.len(),
        config.output_file.display(),
        config.max_concurrency,
        config.per_host_concurrency
    );

    let output_file = config.output_file.clone();
    let sleuth = sleuth::ContactSleuth::new(config).context("Failed to initialize HTTP client")?;
    let summary = sleuth
        .run(tasks)
        .await
        .with_context(|| format!("Failed to write results to '{}'", output_file.display()))?;

    log_summary(&summary);
    info!("Done! Results saved to {} in input order.", output_file.display());

    Ok(())
}

fn log_summary(summary: &sleuth::RunSummary) {
    info!("-------------------- Harvest Summary --------------------");
    info!("Domains in input          : {}", summary.total);
    info!("  - Emails found          : {}", summary.found);
    info!("    (recovered in pass 2) : {}", summary.recovered_in_deep_pass);
    info!("    (kept from resume)    : {}", summary.resumed);
    info!("  - Not found             : {}", summary.not_found);
    info!("Total time taken          : {:.2?}", summary.elapsed);
    if summary.elapsed > Duration::from_millis(10) && summary.total > 0 {
        let rate = summary.total as f64 / summary.elapsed.as_secs_f64();
        info!("Processing rate           : {:.2} domains/sec", rate);
    }
    info!("---------------------------------------------------------");
}
