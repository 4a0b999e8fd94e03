//! Inactive-ingredient extraction
//!
//! Two strategies share one contract. The markup strategy walks the DOM from
//! the "Inactive ingredients" heading to the nearest list, table rows, or
//! delimited text. The backend strategy sends the isolated section (or the
//! page text) to the analysis backend and expects a JSON array back.
//!
//! Neither strategy treats a missing section as an error: both return an
//! empty list, which the orchestrator turns into a conservative
//! disqualification.

use super::page::{element_text, has_inactive_ndc_warning, raw_text};
use super::{normalize_ingredients, Ingredient, LabelPage, Method};
use crate::analysis::{AnalysisBackend, AnalysisError, AnalysisRequest, BackendGate};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::Arc;

/// Outcome of the warning check plus ingredient extraction for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientExtractionResult {
    pub ingredients: Vec<Ingredient>,
    pub warning_present: bool,
    pub method: Method,
}

/// A way of pulling the inactive-ingredient list out of a page
#[async_trait]
pub trait IngredientStrategy: Send + Sync {
    fn method(&self) -> Method;

    async fn extract(&self, page: &LabelPage) -> Result<Vec<Ingredient>, AnalysisError>;
}

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*inactive\s+(?:ingredients?|components?)\s*:?\s*$")
        .expect("valid heading regex")
});

static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)inactive\s+(?:ingredients?|components?)\s*:\s*(.+)")
        .expect("valid inline regex")
});

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)inactive\s+(?:ingredients?|components?)\s*:?(.*)")
        .expect("valid mention regex")
});

static SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;•\n\r]+").expect("valid delimiter regex"));

static INGREDIENT_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^ingredient\s+name\b").expect("valid header row regex"));

static SECTION_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:active\s+(?:ingredients?|moiety)|inactive\s+(?:ingredients?|components?)|packaging|product\s+characteristics|marketing\s+information|ingredients\s+and\s+appearance)\b",
    )
    .expect("valid section row regex")
});

static COLLAPSIBLE_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)collapse|expand|accordion|dropdown").expect("valid collapsible regex")
});

static BODY_ELEMENTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body *").expect("valid body selector"));

static INLINE_CANDIDATES: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("p, div, span, li, td, dd, section").expect("valid inline selector")
});

static COLLAPSIBLES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div, section").expect("valid collapsible selector"));

static ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid row selector"));

static CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td, th").expect("valid cell selector"));

static LIST_ITEMS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li").expect("valid list item selector"));

const INLINE_TAGS: &[&str] = &["b", "strong", "span", "em", "i", "u", "label", "a", "font"];
const BLOCK_TAGS: &[&str] = &[
    "div", "p", "ul", "ol", "table", "section", "h1", "h2", "h3", "h4", "h5", "h6", "dl",
];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

const FRAGMENT_LIMIT: usize = 5000;
const PAGE_TEXT_LIMIT: usize = 8000;

/// Structural extraction from the served markup
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupIngredientStrategy;

impl MarkupIngredientStrategy {
    /// Extracts ingredients from raw HTML, or an empty list if no section is found
    pub fn extract_from_html(&self, html: &str) -> Vec<Ingredient> {
        let document = Html::parse_document(html);

        for heading in document
            .select(&BODY_ELEMENTS)
            .filter(|el| HEADING_RE.is_match(&element_text(*el)))
        {
            let entries = normalize_ingredients(entries_after_heading(heading));
            if !entries.is_empty() {
                tracing::trace!(
                    "Found {} ingredients after <{}>",
                    entries.len(),
                    heading.value().name()
                );
                return entries;
            }
        }

        if let Some(captured) = smallest_inline_section(&document) {
            let entries = normalize_ingredients(split_entries(&captured));
            if !entries.is_empty() {
                tracing::trace!("Found {} ingredients in inline section", entries.len());
                return entries;
            }
        }

        for region in document.select(&COLLAPSIBLES).filter(|el| {
            el.value()
                .attr("class")
                .map(|class| COLLAPSIBLE_CLASS_RE.is_match(class))
                .unwrap_or(false)
        }) {
            let text = raw_text(region);
            if let Some(rest) = MENTION_RE.captures(&text).and_then(|c| c.get(1)) {
                let entries = normalize_ingredients(split_entries(rest.as_str()));
                if !entries.is_empty() {
                    tracing::trace!("Found {} ingredients in collapsible region", entries.len());
                    return entries;
                }
            }
        }

        Vec::new()
    }
}

#[async_trait]
impl IngredientStrategy for MarkupIngredientStrategy {
    fn method(&self) -> Method {
        Method::Fallback
    }

    async fn extract(&self, page: &LabelPage) -> Result<Vec<Ingredient>, AnalysisError> {
        Ok(self.extract_from_html(&page.raw_html))
    }
}

fn split_entries(text: &str) -> Vec<String> {
    SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn entries_after_heading(heading: ElementRef<'_>) -> Vec<String> {
    let name = heading.value().name();

    if name == "tr" {
        return table_rows_after(heading);
    }
    if name == "td" || name == "th" {
        if let Some(row) = heading
            .parent()
            .and_then(ElementRef::wrap)
            .filter(|p| p.value().name() == "tr")
        {
            return table_rows_after(row);
        }
    }

    if INLINE_TAGS.contains(&name) {
        let inline = inline_text_after(heading);
        if !inline.is_empty() {
            return inline;
        }
    }

    block_siblings_after(heading)
}

/// Reads the first cell of every row after `heading_row` in the same table
fn table_rows_after(heading_row: ElementRef<'_>) -> Vec<String> {
    let Some(table) = heading_row
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
    else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut after_heading = false;

    for row in table.select(&ROWS) {
        if row.id() == heading_row.id() {
            after_heading = true;
            continue;
        }
        if !after_heading {
            continue;
        }

        let Some(cell) = row.select(&CELLS).next() else {
            continue;
        };
        let text = element_text(cell);
        if text.is_empty() || INGREDIENT_HEADER_RE.is_match(&text) {
            continue;
        }
        if SECTION_ROW_RE.is_match(&text) {
            break;
        }
        entries.push(text);
    }

    entries
}

/// Text that follows an inline heading inside the same block
fn inline_text_after(heading: ElementRef<'_>) -> Vec<String> {
    let mut text = String::new();

    for sibling in heading.next_siblings() {
        if let Some(fragment) = sibling.value().as_text() {
            text.push_str(fragment);
            continue;
        }
        if let Some(element) = ElementRef::wrap(sibling) {
            let name = element.value().name();
            if BLOCK_TAGS.contains(&name) {
                break;
            }
            if name == "br" {
                text.push('\n');
            } else {
                text.push(' ');
                text.push_str(&raw_text(element));
            }
        }
    }

    split_entries(&text)
}

/// First following sibling of a block heading that yields entries
fn block_siblings_after(heading: ElementRef<'_>) -> Vec<String> {
    for sibling in heading.next_siblings() {
        if let Some(fragment) = sibling.value().as_text() {
            let entries = split_entries(fragment);
            if !entries.is_empty() {
                return entries;
            }
            continue;
        }

        let Some(element) = ElementRef::wrap(sibling) else {
            continue;
        };
        if HEADING_TAGS.contains(&element.value().name()) {
            break;
        }

        let entries = list_entries(element);
        if !entries.is_empty() {
            return entries;
        }
    }

    Vec::new()
}

fn list_entries(element: ElementRef<'_>) -> Vec<String> {
    let items: Vec<String> = element
        .select(&LIST_ITEMS)
        .flat_map(|li| split_entries(&raw_text(li)))
        .collect();

    if items.is_empty() {
        split_entries(&raw_text(element))
    } else {
        items
    }
}

/// Text after "Inactive ingredients:" in the most specific element carrying it
fn smallest_inline_section(document: &Html) -> Option<String> {
    document
        .select(&INLINE_CANDIDATES)
        .filter_map(|el| {
            let text = raw_text(el);
            let captured = INLINE_RE.captures(&text)?.get(1)?.as_str().to_string();
            Some((text.len(), captured))
        })
        .min_by_key(|(len, _)| *len)
        .map(|(_, captured)| captured)
}

/// HTML of the region around the ingredients heading, if one exists
fn isolate_section(document: &Html) -> Option<String> {
    let heading = document
        .select(&BODY_ELEMENTS)
        .find(|el| HEADING_RE.is_match(&element_text(*el)));

    if let Some(heading) = heading {
        let row = std::iter::once(heading)
            .chain(heading.ancestors().filter_map(ElementRef::wrap))
            .find(|el| el.value().name() == "tr");
        if let Some(section) = row.and_then(table_section_html) {
            return Some(section);
        }
        return heading.parent().and_then(ElementRef::wrap).map(|el| el.html());
    }

    document
        .select(&INLINE_CANDIDATES)
        .filter(|el| INLINE_RE.is_match(&raw_text(*el)))
        .min_by_key(|el| raw_text(*el).len())
        .map(|el| el.html())
}

/// The heading row and the rows after it, up to the next section row
fn table_section_html(heading_row: ElementRef<'_>) -> Option<String> {
    let table = heading_row
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")?;

    let mut rows = Vec::new();
    for row in table.select(&ROWS) {
        if row.id() == heading_row.id() {
            rows.push(row.html());
            continue;
        }
        if rows.is_empty() {
            continue;
        }

        let first_cell = row.select(&CELLS).next().map(element_text).unwrap_or_default();
        if SECTION_ROW_RE.is_match(&first_cell) {
            break;
        }
        rows.push(row.html());
    }

    if rows.is_empty() {
        None
    } else {
        Some(format!("<table>\n{}\n</table>", rows.join("\n")))
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

const INGREDIENT_SYSTEM_PROMPT: &str = "You are a medical label parser. Extract ingredient lists from HTML. Respond only with a valid JSON array.";

static JSON_ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("valid JSON array regex"));

/// Asks the analysis backend to read the ingredient list
#[derive(Debug, Clone)]
pub struct AiIngredientStrategy {
    backend: Arc<dyn AnalysisBackend>,
}

impl AiIngredientStrategy {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    fn prompt(html: &str) -> String {
        let document = Html::parse_document(html);
        let excerpt = match isolate_section(&document) {
            Some(section) => format!("HTML excerpt:\n{}", truncate_chars(&section, FRAGMENT_LIMIT)),
            None => {
                let text = element_text(document.root_element());
                format!("Page text:\n{}", truncate_chars(&text, PAGE_TEXT_LIMIT))
            }
        };

        format!(
            r#"Extract the complete list of inactive ingredients from this medication label.

Focus on the "Inactive ingredients" or "Inactive components" section. The ingredients usually follow that heading, possibly inside a collapsible section or a table.

{excerpt}

Respond with ONLY a JSON array of ingredient names in this exact format:
["ingredient1", "ingredient2", "ingredient3"]

If you cannot find inactive ingredients, return an empty array: []"#
        )
    }

    fn parse_answer(answer: &str) -> Result<Vec<Ingredient>, AnalysisError> {
        let array = JSON_ARRAY_RE
            .find(answer)
            .ok_or_else(|| AnalysisError::ParseError("no JSON array in response".to_string()))?;

        let values: Vec<serde_json::Value> = serde_json::from_str(array.as_str())
            .map_err(|e| AnalysisError::ParseError(e.to_string()))?;

        let raw = values.into_iter().filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });

        Ok(normalize_ingredients(raw))
    }
}

#[async_trait]
impl IngredientStrategy for AiIngredientStrategy {
    fn method(&self) -> Method {
        Method::Primary
    }

    async fn extract(&self, page: &LabelPage) -> Result<Vec<Ingredient>, AnalysisError> {
        let prompt = Self::prompt(&page.raw_html);
        let request = AnalysisRequest {
            system: INGREDIENT_SYSTEM_PROMPT,
            prompt: &prompt,
            max_tokens: 500,
        };
        let answer = self.backend.complete(&request).await?;
        Self::parse_answer(&answer)
    }
}

/// Warning detection and ingredient extraction for label pages
pub struct IngredientExtractor {
    primary: Option<Box<dyn IngredientStrategy>>,
    fallback: MarkupIngredientStrategy,
    gate: Arc<BackendGate>,
}

impl IngredientExtractor {
    pub fn new(backend: Option<Arc<dyn AnalysisBackend>>, gate: Arc<BackendGate>) -> Self {
        Self {
            primary: backend.map(|backend| {
                Box::new(AiIngredientStrategy::new(backend)) as Box<dyn IngredientStrategy>
            }),
            fallback: MarkupIngredientStrategy,
            gate,
        }
    }

    /// Whether the page carries the inactive-NDC warning
    pub fn has_inactive_ndc_warning(&self, page: &LabelPage) -> bool {
        has_inactive_ndc_warning(&page.document())
    }

    /// Extracts the ingredient list, preferring the backend while it is healthy
    ///
    /// An empty backend answer is double-checked against the markup.
    pub async fn extract_ingredients(&self, page: &LabelPage) -> (Vec<Ingredient>, Method) {
        if let Some(primary) = self.primary.as_ref().filter(|_| self.gate.is_open()) {
            match primary.extract(page).await {
                Ok(ingredients) if !ingredients.is_empty() => {
                    return (ingredients, Method::Primary);
                }
                Ok(_) => {
                    tracing::debug!(
                        "Backend found no ingredients on {}, checking markup",
                        page.reference.url
                    );
                }
                Err(e) => {
                    tracing::debug!("Backend extraction failed for {}: {}", page.reference.url, e);
                    self.gate.record_failure(&e);
                }
            }
        }

        (self.fallback.extract_from_html(&page.raw_html), Method::Fallback)
    }

    /// Runs the warning check and, if the page is clean, the extraction
    pub async fn extract(&self, page: &LabelPage) -> IngredientExtractionResult {
        if self.has_inactive_ndc_warning(page) {
            return IngredientExtractionResult {
                ingredients: Vec::new(),
                warning_present: true,
                method: Method::Fallback,
            };
        }

        let (ingredients, method) = self.extract_ingredients(page).await;
        IngredientExtractionResult {
            ingredients,
            warning_present: false,
            method,
        }
    }
}

impl fmt::Debug for IngredientExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngredientExtractor")
            .field("primary", &self.primary.as_ref().map(|p| p.method()))
            .field("gate", &self.gate)
            .finish()
    }
}
