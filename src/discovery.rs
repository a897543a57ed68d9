//! Finds the handful of pages on a site most likely to list contact emails.

use crate::models::PageCandidate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Link text or href fragments that usually lead to contact details.
const PAGE_KEYWORDS: &[&str] = &[
    "contact",
    "about",
    "team",
    "support",
    "impressum",
    "privacy",
    "kontakt",
    "contacto",
    "contatto",
    "contato",
    "nous-contacter",
    "a-propos",
    "ueber-uns",
    "uber-uns",
    "equipe",
    "datenschutz",
    "mentions-legales",
];

static STRUCTURAL_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("footer a[href], nav a[href], aside a[href]").expect("selector is valid")
});
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("selector is valid"));

fn matches_keyword(element: &ElementRef<'_>, href: &str) -> bool {
    let href = href.to_lowercase();
    let text = element.text().collect::<String>().to_lowercase();
    PAGE_KEYWORDS
        .iter()
        .any(|keyword| href.contains(keyword) || text.contains(keyword))
}

/// Returns the candidate pages for `base_url`, home page first.
///
/// # Arguments
/// * `base_url` - The home URL, reported verbatim for the home candidate.
/// * `html` - The fetched home page, or `None` when the fetch failed.
/// * `max_pages` - Upper bound on the returned list, home page included.
pub(crate) fn discover_pages(
    base_url: &str,
    html: Option<&str>,
    max_pages: usize,
) -> Vec<PageCandidate> {
    let mut pages = vec![PageCandidate::home(base_url)];

    let Some(html) = html else {
        return pages;
    };
    let base = match Url::parse(base_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(target: "discovery", "Cannot parse base URL {}: {}", base_url, e);
            return pages;
        }
    };

    let document = Html::parse_document(html);

    let structural = document
        .select(&STRUCTURAL_LINK_SELECTOR)
        .filter_map(|element| element.value().attr("href"));
    let keyword = document.select(&LINK_SELECTOR).filter_map(|element| {
        let href = element.value().attr("href")?;
        matches_keyword(&element, href).then_some(href)
    });

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(base.to_string());

    for href in structural.chain(keyword) {
        if pages.len() >= max_pages {
            break;
        }
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let mut resolved = match base.join(href) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(target: "discovery", "Skipping unresolvable link '{}': {}", href, e);
                continue;
            }
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        if seen.insert(resolved.to_string()) {
            pages.push(PageCandidate::discovered(resolved.to_string()));
        }
    }

    pages.truncate(max_pages.max(1));
    tracing::debug!(target: "discovery", "Discovered {} candidate pages for {}", pages.len(), base_url);
    pages
}
