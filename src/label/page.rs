//! Title and warning helpers for label pages

use super::collapse_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h1", ".drug-title", ".label-title", "title"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static TITLE_ELEMENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid title selector"));

static ALL_ELEMENTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("*").expect("valid universal selector"));

static WARNING_PHRASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)inactive\s+ndc").expect("valid warning phrase regex"));

static WARNING_MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)inactive.*ndc").expect("valid warning mention regex"));

const TITLE_PREFIX: &str = "DailyMed - ";

/// Extracts the product title from a label page
///
/// Tries `h1`, `.drug-title`, `.label-title`, then `title`, taking the first
/// text longer than five characters. Falls back to any `title` text. A
/// leading `DailyMed - ` is removed.
pub fn extract_title(document: &Html) -> Option<String> {
    let title = TITLE_SELECTORS
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .map(element_text)
        .find(|text| text.chars().count() > 5)
        .or_else(|| {
            document
                .select(&TITLE_ELEMENT)
                .next()
                .map(element_text)
                .filter(|text| !text.is_empty())
        })?;

    let title = title
        .strip_prefix(TITLE_PREFIX)
        .map(str::trim)
        .unwrap_or(&title)
        .to_string();

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Checks for the warning that a label covers inactive NDC codes
///
/// The exact phrase anywhere in the text is enough. A looser mention of both
/// "inactive" and "NDC" counts only inside warning-styled markup.
pub fn has_inactive_ndc_warning(document: &Html) -> bool {
    for element in document.select(&ALL_ELEMENTS) {
        if matches!(element.value().name(), "script" | "style" | "noscript") {
            continue;
        }

        for child in element.children() {
            let Some(text) = child.value().as_text() else {
                continue;
            };

            if WARNING_PHRASE_RE.is_match(text) {
                return true;
            }

            if WARNING_MENTION_RE.is_match(text) {
                let parent_styled = element
                    .parent()
                    .and_then(ElementRef::wrap)
                    .map(is_warning_styled)
                    .unwrap_or(false);
                if is_warning_styled(element) || parent_styled {
                    return true;
                }
            }
        }
    }

    false
}

fn is_warning_styled(element: ElementRef<'_>) -> bool {
    let value = element.value();

    let class = value.attr("class").unwrap_or_default().to_lowercase();
    if ["red", "warning", "error", "alert"]
        .iter()
        .any(|marker| class.contains(marker))
    {
        return true;
    }

    let style: String = value
        .attr("style")
        .unwrap_or_default()
        .to_lowercase()
        .split_whitespace()
        .collect();
    style.contains("red") || style.contains("color:#")
}

/// Visible text of an element with whitespace collapsed
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&raw_text(element))
}

/// Text of an element with node boundaries kept as spaces
pub(crate) fn raw_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}
