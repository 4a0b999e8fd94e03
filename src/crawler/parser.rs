//! HTML parser for search results pages
//!
//! This module handles parsing a results page to extract:
//! - Candidate label references (links carrying a `setid`)
//! - Whether the page advertises a further results page

use crate::url::{canonical_reference, resolve_link, CandidateReference};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Extracted information from one results page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsPage {
    /// Label references in document order, possibly repeating
    pub references: Vec<CandidateReference>,

    /// True if the page links to a later page
    pub has_next: bool,
}

static ANCHORS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Anchor texts that advance to the next page
const NEXT_LABELS: &[&str] = &[
    "next", "next page", "next »", "next ›", "next >", ">", ">>", "»", "›",
];

/// Parses a results page
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href>` whose href contains `lookup.cfm` or `setid=` and resolves to
///   an HTTP(S) URL with a non-empty `setid` parameter
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only links
/// - Anything without a `setid`
///
/// # Next-Page Detection
///
/// A later page exists if any link carries `page=N` with N above
/// `current_page`, or an enabled link is labelled as a next control.
///
/// # Example
///
/// ```
/// use label_sieve::crawler::parse_results_page;
/// use url::Url;
///
/// let html = r#"<a href="/dailymed/lookup.cfm?setid=abc">Label</a><a href="?page=2">2</a>"#;
/// let base = Url::parse("https://dailymed.nlm.nih.gov/dailymed/search.cfm?query=x&page=1").unwrap();
/// let page = parse_results_page(html, &base, 1);
/// assert_eq!(page.references.len(), 1);
/// assert!(page.has_next);
/// ```
pub fn parse_results_page(html: &str, base_url: &Url, current_page: u32) -> ResultsPage {
    let document = Html::parse_document(html);
    let mut page = ResultsPage::default();

    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        if let Some(reference) = canonical_reference(href, base_url) {
            page.references.push(reference);
            continue;
        }

        if !page.has_next
            && (links_to_later_page(href, base_url, current_page) || is_next_control(anchor))
        {
            page.has_next = true;
        }
    }

    page
}

fn links_to_later_page(href: &str, base_url: &Url, current_page: u32) -> bool {
    let Some(url) = resolve_link(href, base_url) else {
        return false;
    };

    let target = url
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("page"))
        .and_then(|(_, value)| value.trim().parse::<u32>().ok());
    matches!(target, Some(n) if n > current_page)
}

fn is_next_control(anchor: ElementRef<'_>) -> bool {
    let text = anchor.text().collect::<String>().trim().to_lowercase();
    if !NEXT_LABELS.contains(&text.as_str()) {
        return false;
    }

    !is_disabled(anchor)
        && !anchor
            .parent()
            .and_then(ElementRef::wrap)
            .map(is_disabled)
            .unwrap_or(false)
}

fn is_disabled(element: ElementRef<'_>) -> bool {
    let value = element.value();
    let class_disabled = value
        .attr("class")
        .map(|class| class.to_lowercase().contains("disabled"))
        .unwrap_or(false);
    let aria_disabled = value
        .attr("aria-disabled")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    class_disabled || aria_disabled
}
