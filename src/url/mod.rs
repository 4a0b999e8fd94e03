//! URL handling module for Label-Sieve
//!
//! This module builds search requests and turns result links into
//! deduplicable candidate references.

mod canonical;

pub use canonical::{canonical_reference, resolve_link};

use crate::UrlError;
use url::Url;

/// One search request against the label search endpoint
///
/// Built once per results page and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    term: String,
    page_size: u32,
    page: u32,
}

impl SearchQuery {
    /// Creates a query for the given 1-based page; page 0 is clamped to 1
    pub fn new(term: &str, page_size: u32, page: u32) -> Self {
        Self {
            term: term.to_string(),
            page_size,
            page: page.max(1),
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page(&self) -> u32 {
        self.page
    }
}

/// A candidate label page discovered in search results
///
/// `canonical_id` is the deduplication key; `url` is the normalized locator
/// used to fetch the label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateReference {
    pub canonical_id: String,
    pub url: String,
}

/// Builds the search URL for a query
///
/// # Arguments
///
/// * `base_url` - The search endpoint (e.g. `https://dailymed.nlm.nih.gov/dailymed/search.cfm`)
/// * `query` - The search query
/// * `label_type` - Label-type filter sent as `labeltype`
///
/// # Examples
///
/// ```
/// use label_sieve::url::{search_url, SearchQuery};
///
/// let query = SearchQuery::new("hydrocortisone", 200, 2);
/// let url = search_url("https://dailymed.nlm.nih.gov/dailymed/search.cfm", &query, "all").unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://dailymed.nlm.nih.gov/dailymed/search.cfm?labeltype=all&query=hydrocortisone&pagesize=200&page=2"
/// );
/// ```
pub fn search_url(base_url: &str, query: &SearchQuery, label_type: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(base_url).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    url.query_pairs_mut()
        .append_pair("labeltype", label_type)
        .append_pair("query", query.term())
        .append_pair("pagesize", &query.page_size().to_string())
        .append_pair("page", &query.page().to_string());

    Ok(url)
}
