//! Pulls candidate email addresses out of page text and `mailto:` links.

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;

/// Matches canonical addresses as well as the usual human obfuscations of
/// `@` and `.` ("[at]", "(at)", " at ", full-width glyphs, ...).
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        [\w.%+-]+
        (?: \s*\[at\]\s* | \s*\(at\)\s* | \s+at\s+ | \s+à\s+ | @ | ＠ )
        [\w-]+
        (?:
            (?: \s*\[dot\]\s* | \s*\(dot\)\s* | \s+dot\s+ | \. | 。 | ． )
            [\w-]+
        )+
        ",
    )
    .expect("email pattern is valid")
});

/// Token replacements, applied in this order after lowercasing.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("[at]", "@"),
    ("(at)", "@"),
    (" at ", "@"),
    (" à ", "@"),
    ("＠", "@"),
    ("&#64;", "@"),
    ("&#46;", "."),
    (" dot ", "."),
    ("。", "."),
    ("．", "."),
    ("[dot]", "."),
    ("(dot)", "."),
];

static MAILTO_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("selector is valid"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("selector is valid"));

/// Visible text and `mailto:` hrefs of a parsed page.
#[derive(Debug, Default)]
pub(crate) struct PageContent {
    pub text: String,
    pub mailto_hrefs: Vec<String>,
}

/// Parses HTML into the two inputs of [`extract_emails`].
pub(crate) fn page_content(html: &str) -> PageContent {
    let document = Html::parse_document(html);

    let mailto_hrefs = document
        .select(&MAILTO_LINK_SELECTOR)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| {
            href.get(..7)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:"))
        })
        .map(str::to_string)
        .collect();

    let mut text = String::new();
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());
    for fragment in root.text() {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        text.push_str(fragment);
        text.push(' ');
    }

    PageContent { text, mailto_hrefs }
}

/// Normalizes one raw candidate into a plain lowercase address.
pub(crate) fn normalize_candidate(raw: &str) -> String {
    let mut email = percent_decode_str(raw).decode_utf8_lossy().to_lowercase();
    for (token, replacement) in REPLACEMENTS {
        if email.contains(token) {
            email = email.replace(token, replacement);
        }
    }
    email.retain(|c| !c.is_whitespace());
    email.trim_matches('.').to_string()
}

/// Recipients of a `mailto:` href, without query or fragment.
fn mailto_recipients(href: &str) -> Vec<String> {
    let Some((_, rest)) = href.split_once(':') else {
        return Vec::new();
    };
    let address_part = rest.split(['?', '#']).next().unwrap_or("");
    let decoded = percent_decode_str(address_part.trim()).decode_utf8_lossy();
    decoded
        .split(',')
        .map(str::trim)
        .filter(|recipient| !recipient.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns the normalized, deduplicated candidates found in `text` and the
/// given `mailto:` hrefs. Candidates are not validated here.
pub(crate) fn extract_emails<S: AsRef<str>>(text: &str, mailto_hrefs: &[S]) -> BTreeSet<String> {
    let from_text = EMAIL_PATTERN.find_iter(text).map(|m| m.as_str().to_string());
    let from_links = mailto_hrefs
        .iter()
        .flat_map(|href| mailto_recipients(href.as_ref()));

    from_text
        .chain(from_links)
        .map(|raw| normalize_candidate(&raw))
        .filter(|email| !email.is_empty())
        .collect()
}

/// Convenience wrapper: parse the page and extract candidates from it.
pub(crate) fn extract_from_html(html: &str) -> BTreeSet<String> {
    let content = page_content(html);
    extract_emails(&content.text, &content.mailto_hrefs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_obfuscated_variants_collapse() {
        let text = "Contact: foo [at] bar [dot] com or write to foo (at) bar (dot) com";
        let none: [&str; 0] = [];
        assert_eq!(extract_emails(text, &none), set(&["foo@bar.com"]));
    }

    #[test]
    fn test_uppercase_bracket_tokens() {
        assert_eq!(normalize_candidate("A[AT]b[DOT]com"), "a@b.com");
        assert_eq!(normalize_candidate("a (at) b (dot) com"), "a@b.com");
        assert_eq!(normalize_candidate("info at shop dot co dot uk"), "info@shop.co.uk");
    }

    #[test]
    fn test_full_width_glyphs() {
        let none: [&str; 0] = [];
        assert_eq!(
            extract_emails("お問い合わせ: info＠example。jp", &none),
            set(&["info@example.jp"])
        );
    }

    #[test]
    fn test_mailto_strips_query_and_fragment() {
        let hrefs = ["mailto:a@b.com?subject=Hi", "MAILTO:Sales%40B.com#top"];
        assert_eq!(extract_emails("", &hrefs), set(&["a@b.com", "sales@b.com"]));
    }

    #[test]
    fn test_mailto_multiple_recipients() {
        let hrefs = ["mailto:one@b.com,%20two@b.com"];
        assert_eq!(extract_emails("", &hrefs), set(&["one@b.com", "two@b.com"]));
    }

    #[test]
    fn test_text_and_mailto_deduplicate() {
        let hrefs = ["mailto:info@example.com"];
        let found = extract_emails("Write to INFO@example.com today.", &hrefs);
        assert_eq!(found, set(&["info@example.com"]));
    }

    #[test]
    fn test_empty_input() {
        let none: [&str; 0] = [];
        assert!(extract_emails("", &none).is_empty());
        assert!(extract_from_html("").is_empty());
    }

    #[test]
    fn test_trailing_sentence_period_not_included() {
        let none: [&str; 0] = [];
        assert_eq!(
            extract_emails("Reach us at hello@example.org.", &none),
            set(&["hello@example.org"])
        );
    }

    #[test]
    fn test_page_content_reads_body_and_mailto_links() {
        let html = r#"
            <html><head><title>ignored@title.com</title></head>
            <body>
              <p>Support:</p><p>help [at] example [dot] com</p>
              <a href="Mailto:press@example.com?subject=x">Press</a>
              <a href="/contact">Contact</a>
            </body></html>
        "#;
        let content = page_content(html);
        assert_eq!(content.mailto_hrefs, vec!["Mailto:press@example.com?subject=x"]);
        assert!(content.text.contains("help [at] example [dot] com"));
        assert!(!content.text.contains("ignored@title.com"));

        assert_eq!(
            extract_from_html(html),
            set(&["help@example.com", "press@example.com"])
        );
    }
}
