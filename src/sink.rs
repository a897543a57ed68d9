//! The single writer for domain results.
//!
//! Results arrive over a channel in completion order. During the first pass
//! each one is appended to the output file as it lands (advisory only); the
//! authoritative file is rewritten at the end in input order.

use crate::error::Result;
use crate::models::{DomainResult, NOT_FOUND};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

pub(crate) const HEADER: [&str; 3] = ["domain", "emails", "target_website"];

/// One output row, as written to and read back from the CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CsvRow {
    pub domain: String,
    pub emails: String,
    pub target_website: String,
}

impl From<&DomainResult> for CsvRow {
    fn from(result: &DomainResult) -> Self {
        Self {
            domain: result.hostname.clone(),
            emails: result.emails_field(),
            target_website: result.target_field().to_string(),
        }
    }
}

fn csv_writer<W: io::Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().has_headers(false).from_writer(inner)
}

/// Collects results keyed by index, optionally appending each to a file.
pub(crate) struct ResultSink {
    results: BTreeMap<usize, DomainResult>,
    interim: Option<csv::Writer<File>>,
}

impl ResultSink {
    /// A sink that only keeps results in memory.
    pub(crate) fn in_memory() -> Self {
        Self {
            results: BTreeMap::new(),
            interim: None,
        }
    }

    /// A sink that also truncates `path`, writes the header and appends each
    /// result as it arrives.
    pub(crate) fn with_interim_file(path: &Path) -> Result<Self> {
        let mut writer = csv_writer(File::create(path)?);
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self {
            results: BTreeMap::new(),
            interim: Some(writer),
        })
    }

    /// Stores `result`, replacing any earlier result for the same index.
    pub(crate) fn record(&mut self, result: DomainResult) {
        if let Some(writer) = self.interim.as_mut() {
            let appended = writer
                .serialize(CsvRow::from(&result))
                .and_then(|_| writer.flush().map_err(csv::Error::from));
            if let Err(e) = appended {
                tracing::warn!(target: "sink", "Interim write for {} failed: {}", result.hostname, e);
            }
        }
        self.results.insert(result.index, result);
    }

    /// Receives until every sender is dropped, then returns the results.
    pub(crate) async fn drain(
        mut self,
        mut receiver: mpsc::Receiver<DomainResult>,
        progress: ProgressBar,
    ) -> BTreeMap<usize, DomainResult> {
        while let Some(result) = receiver.recv().await {
            progress.set_message(result.hostname.clone());
            progress.inc(1);
            self.record(result);
        }
        progress.finish_with_message("done");
        self.results
    }
}

/// Writes the header and every result, in index order, to `writer`.
pub(crate) fn write_rows<'a, W, I>(writer: W, results: I) -> Result<()>
where
    W: io::Write,
    I: IntoIterator<Item = &'a DomainResult>,
{
    let mut rows: Vec<&DomainResult> = results.into_iter().collect();
    rows.sort_by_key(|result| result.index);

    let mut writer = csv_writer(writer);
    writer.write_record(HEADER)?;
    for result in rows {
        writer.serialize(CsvRow::from(result))?;
    }
    writer.flush()?;
    Ok(())
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "results.csv".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces `path` with the authoritative, index-ordered output.
pub(crate) fn write_final(path: &Path, results: &BTreeMap<usize, DomainResult>) -> Result<()> {
    let temp_path = temporary_sibling(path);
    write_rows(File::create(&temp_path)?, results.values())?;
    std::fs::rename(&temp_path, path)?;
    tracing::info!(target: "sink", "Wrote {} rows to {}", results.len(), path.display());
    Ok(())
}

/// Reads found rows from an earlier output file, keyed by hostname.
/// Rows reading `Not found` are skipped so those domains are tried again.
pub(crate) fn load_previous(path: &Path) -> Result<HashMap<String, (BTreeSet<String>, String)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut found = HashMap::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        if row.emails == NOT_FOUND || row.emails.trim().is_empty() {
            continue;
        }
        let emails: BTreeSet<String> = row
            .emails
            .split(',')
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect();
        found.insert(row.domain, (emails, row.target_website));
    }
    Ok(found)
}
