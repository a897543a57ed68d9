//! Defines the core data structures used in the contact-sleuth application.

use std::collections::BTreeSet;

/// Literal written in the `emails` column when nothing was found.
pub(crate) const NOT_FOUND: &str = "Not found";

/// One domain read from the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DomainTask {
    /// 1-based position among the non-empty input lines.
    pub index: usize,
    /// Hostname with any scheme stripped (e.g. "example.com").
    pub hostname: String,
}

/// Where a candidate page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageOrigin {
    /// The bare `{scheme}://{hostname}` URL.
    Home,
    /// A link found on the home page.
    Discovered,
}

/// A page worth fetching while looking for contact emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageCandidate {
    pub url: String,
    pub origin: PageOrigin,
}

impl PageCandidate {
    pub(crate) fn home(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: PageOrigin::Home,
        }
    }

    pub(crate) fn discovered(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: PageOrigin::Discovered,
        }
    }
}

/// Outcome of trying one or more pages for a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Harvest {
    /// At least one valid email was found; processing for the domain stops here.
    Found {
        page: String,
        emails: BTreeSet<String>,
    },
    NotFound,
}

impl Harvest {
    pub(crate) fn is_found(&self) -> bool {
        matches!(self, Harvest::Found { .. })
    }
}

/// Final record for a single domain. Replaced as a whole, never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DomainResult {
    pub index: usize,
    pub hostname: String,
    /// Validated, lowercase addresses. Empty means "not found".
    pub emails: BTreeSet<String>,
    /// Page that produced `emails`.
    pub source_page: Option<String>,
}

impl DomainResult {
    pub(crate) fn not_found(task: &DomainTask) -> Self {
        Self {
            index: task.index,
            hostname: task.hostname.clone(),
            emails: BTreeSet::new(),
            source_page: None,
        }
    }

    pub(crate) fn from_harvest(task: &DomainTask, harvest: Harvest) -> Self {
        match harvest {
            Harvest::Found { page, emails } => Self {
                index: task.index,
                hostname: task.hostname.clone(),
                emails,
                source_page: Some(page),
            },
            Harvest::NotFound => Self::not_found(task),
        }
    }

    pub(crate) fn is_found(&self) -> bool {
        !self.emails.is_empty()
    }

    /// Value of the `emails` CSV column.
    pub(crate) fn emails_field(&self) -> String {
        if self.emails.is_empty() {
            NOT_FOUND.to_string()
        } else {
            self.emails.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }

    /// Value of the `target_website` CSV column.
    pub(crate) fn target_field(&self) -> &str {
        if self.is_found() {
            self.source_page.as_deref().unwrap_or("")
        } else {
            ""
        }
    }
}
