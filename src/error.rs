//! Defines the custom error types for the contact-sleuth application.

use std::io;
use thiserror::Error;

/// The primary error type for the harvesting process.
///
/// Most variants never leave a single domain's processing: fetchers convert
/// them into soft failures after logging. Only startup and output errors reach
/// the operator.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error reading or writing CSV rows.
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status from a lightweight fetch.
    #[error("HTTP Status {status} for {url}")]
    Status {
        /// The status code returned by the server.
        status: reqwest::StatusCode,
        /// The requested URL.
        url: String,
    },

    /// Error launching or driving the headless browser.
    #[error("Browser Error: {0}")]
    Browser(String),

    /// An operation exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(e.to_string())
    }
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;
