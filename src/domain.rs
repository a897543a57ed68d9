//! Utility functions for reading the domain list and building base URLs.

use crate::error::Result;
use crate::models::DomainTask;
use std::path::Path;

/// Protocols tried for every domain, in order.
pub(crate) const PROTOCOLS: [&str; 2] = ["https", "http"];

/// Extracts the hostname from one input line.
///
/// A leading `http://` or `https://` (any case) is stripped and the first
/// whitespace-delimited token is kept, without trailing slashes.
///
/// # Returns
/// * `None` for blank lines.
pub(crate) fn parse_domain_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_scheme = strip_scheme(trimmed);
    let token = without_scheme.split_whitespace().next()?;
    let hostname = token.trim_end_matches('/');
    if hostname.is_empty() {
        tracing::debug!("Input line '{}' has no hostname after stripping scheme", line);
        return None;
    }
    Some(hostname.to_string())
}

fn strip_scheme(value: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if value
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        {
            return &value[scheme.len()..];
        }
    }
    value
}

/// Builds `DomainTask`s from the raw file content.
///
/// Indices are 1-based and count only non-empty lines, so blank lines never
/// shift the position of later domains relative to each other.
pub(crate) fn parse_domains(content: &str) -> Vec<DomainTask> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .filter_map(|(position, line)| {
            parse_domain_line(line).map(|hostname| DomainTask {
                index: position + 1,
                hostname,
            })
        })
        .collect()
}

/// Reads the input domain list. A missing or unreadable file is fatal.
pub(crate) fn load_domains(path: &Path) -> Result<Vec<DomainTask>> {
    tracing::debug!("Opening input file: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let tasks = parse_domains(&content);
    tracing::debug!("Parsed {} domains from {}", tasks.len(), path.display());
    Ok(tasks)
}

/// The home URL for a protocol, exactly as it is reported in the output.
pub(crate) fn base_url(protocol: &str, hostname: &str) -> String {
    format!("{}://{}", protocol, hostname)
}

/// Host portion of a URL, used to key per-host limits.
pub(crate) fn host_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_lowercase())
            .unwrap_or_else(|| url.to_string()),
        Err(_) => url.to_string(),
    }
}
