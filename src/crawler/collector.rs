//! Paginated result collection
//!
//! The collector walks the search results one page at a time, keeps a
//! run-scoped set of canonical identifiers, and stops on the first of:
//! a page with nothing new, a page without a way forward, the page bound,
//! or a failed page fetch after at least one success.

use super::fetcher::Fetcher;
use super::parser::parse_results_page;
use crate::config::SearchConfig;
use crate::url::{search_url, CandidateReference, SearchQuery};
use crate::SieveError;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// A fetched page contained no unseen label
    NoNewEntries,
    /// The page had no link to a later page
    EndOfResults,
    /// The configured maximum page count was reached
    PageLimit,
    /// A results page could not be fetched after retries
    FetchFailed,
    /// The run was interrupted between pages
    Interrupted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoNewEntries => "no_new_entries",
            Self::EndOfResults => "end_of_results",
            Self::PageLimit => "page_limit",
            Self::FetchFailed => "fetch_failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything gathered by one collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Unique candidates in first-seen order
    pub candidates: Vec<CandidateReference>,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
}

/// Drives pagination for one search term
///
/// Not restartable: a new collector starts again from page 1.
pub struct ResultCollector<'a> {
    fetcher: &'a Fetcher,
    search: &'a SearchConfig,
    term: String,
    seen: HashSet<String>,
    next_page: u32,
    pages_fetched: u32,
    stop_reason: Option<StopReason>,
    interrupted: Option<Arc<AtomicBool>>,
}

impl<'a> ResultCollector<'a> {
    pub fn new(fetcher: &'a Fetcher, search: &'a SearchConfig, term: &str) -> Self {
        Self {
            fetcher,
            search,
            term: term.to_string(),
            seen: HashSet::new(),
            next_page: 1,
            pages_fetched: 0,
            stop_reason: None,
            interrupted: None,
        }
    }

    /// Stops pagination before the next page once `flag` is set
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    /// Fetches the next results page and returns its unseen candidates
    ///
    /// Returns `Ok(None)` once pagination has ended. Only a failure of the
    /// very first page is an error; an interrupt before it is not.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<CandidateReference>>, SieveError> {
        if self.stop_reason.is_some() {
            return Ok(None);
        }
        if self
            .interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            tracing::warn!("Interrupted before results page {}", self.next_page);
            self.stop(StopReason::Interrupted);
            return Ok(None);
        }
        if self.next_page > self.search.max_pages {
            self.stop(StopReason::PageLimit);
            return Ok(None);
        }

        let page = self.next_page;
        let query = SearchQuery::new(&self.term, self.search.page_size, page);
        let url = search_url(&self.search.base_url, &query, &self.search.label_type)?;

        tracing::info!("Fetching results page {} for {:?}", page, self.term);
        let html = match self.fetcher.fetch(url.as_str()).await {
            Ok(html) => html,
            Err(failure) if self.pages_fetched == 0 => {
                tracing::error!("Initial search failed: {}", failure);
                return Err(SieveError::SearchFailed(failure));
            }
            Err(failure) => {
                tracing::warn!(
                    "Stopping pagination at page {}, keeping {} candidates: {}",
                    page,
                    self.seen.len(),
                    failure
                );
                self.stop(StopReason::FetchFailed);
                return Ok(None);
            }
        };
        self.pages_fetched += 1;

        let parsed = parse_results_page(&html, &url, page);
        let found = parsed.references.len();
        let fresh: Vec<CandidateReference> = parsed
            .references
            .into_iter()
            .filter(|reference| self.seen.insert(reference.canonical_id.clone()))
            .collect();

        tracing::info!(
            "Page {}: {} links, {} new (total so far: {})",
            page,
            found,
            fresh.len(),
            self.seen.len()
        );

        if fresh.is_empty() {
            self.stop(StopReason::NoNewEntries);
            return Ok(None);
        }

        if !parsed.has_next {
            self.stop(StopReason::EndOfResults);
        } else if page >= self.search.max_pages {
            self.stop(StopReason::PageLimit);
        }
        self.next_page = page + 1;

        Ok(Some(fresh))
    }

    /// Runs pagination to completion
    pub async fn collect(mut self) -> Result<Collection, SieveError> {
        let mut candidates = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            candidates.extend(batch);
        }

        Ok(Collection {
            candidates,
            pages_fetched: self.pages_fetched,
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndOfResults),
        })
    }

    fn stop(&mut self, reason: StopReason) {
        tracing::debug!("Pagination stopped: {}", reason);
        self.stop_reason = Some(reason);
    }
}

impl fmt::Debug for ResultCollector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCollector")
            .field("term", &self.term)
            .field("next_page", &self.next_page)
            .field("pages_fetched", &self.pages_fetched)
            .field("seen", &self.seen.len())
            .field("stop_reason", &self.stop_reason)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::crawler::fetcher::{build_http_client, RetryPolicy};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        let client =
            build_http_client(&UserAgentConfig::default(), Duration::from_secs(5)).unwrap();
        Fetcher::new(
            "pagination",
            client,
            Duration::ZERO,
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                multiplier: 2,
            },
        )
    }

    fn search_config(server: &MockServer, max_pages: u32) -> SearchConfig {
        SearchConfig {
            base_url: format!("{}/dailymed/search.cfm", server.uri()),
            max_pages,
            ..SearchConfig::default()
        }
    }

    fn results_html(ids: &[&str], next_page: Option<u32>) -> String {
        let mut html = String::from("<html><body>");
        for id in ids {
            html.push_str(&format!(
                r#"<a href="/dailymed/drugInfo.cfm?setid={id}&audience=consumer">{id}</a>"#
            ));
        }
        if let Some(next) = next_page {
            html.push_str(&format!(r#"<a href="search.cfm?query=x&page={next}">{next}</a>"#));
        }
        html.push_str("</body></html>");
        html
    }

    async fn mount_page(server: &MockServer, page: u32, body: String) {
        Mock::given(method("GET"))
            .and(path("/dailymed/search.cfm"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_dedup_across_pages() {
        let server = MockServer::start().await;
        mount_page(&server, 1, results_html(&["a", "b"], Some(2))).await;
        mount_page(&server, 2, results_html(&["B", "c", "a"], Some(3))).await;
        mount_page(&server, 3, results_html(&["c"], Some(4))).await;

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let collection = ResultCollector::new(&fetcher, &search, "x").collect().await.unwrap();

        let ids: Vec<_> = collection.candidates.iter().map(|c| c.canonical_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(collection.pages_fetched, 3);
        assert_eq!(collection.stop_reason, StopReason::NoNewEntries);
    }

    #[tokio::test]
    async fn test_end_of_results_signal() {
        let server = MockServer::start().await;
        mount_page(&server, 1, results_html(&["a"], Some(2))).await;
        mount_page(&server, 2, results_html(&["b"], None)).await;

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let collection = ResultCollector::new(&fetcher, &search, "x").collect().await.unwrap();

        assert_eq!(collection.candidates.len(), 2);
        assert_eq!(collection.pages_fetched, 2);
        assert_eq!(collection.stop_reason, StopReason::EndOfResults);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let server = MockServer::start().await;
        for page in 1..=5 {
            let id = format!("id{page}");
            mount_page(&server, page, results_html(&[id.as_str()], Some(page + 1))).await;
        }

        let fetcher = fetcher();
        let search = search_config(&server, 3);
        let collection = ResultCollector::new(&fetcher, &search, "x").collect().await.unwrap();

        assert_eq!(collection.candidates.len(), 3);
        assert_eq!(collection.pages_fetched, 3);
        assert_eq!(collection.stop_reason, StopReason::PageLimit);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_first_page_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let err = ResultCollector::new(&fetcher, &search, "x").collect().await.unwrap_err();
        assert!(matches!(err, SieveError::SearchFailed(_)));
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_partial_results() {
        let server = MockServer::start().await;
        mount_page(&server, 1, results_html(&["a", "b"], Some(2))).await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let collection = ResultCollector::new(&fetcher, &search, "x").collect().await.unwrap();

        assert_eq!(collection.candidates.len(), 2);
        assert_eq!(collection.pages_fetched, 1);
        assert_eq!(collection.stop_reason, StopReason::FetchFailed);
    }

    #[tokio::test]
    async fn test_interrupt_stops_pagination() {
        let server = MockServer::start().await;
        for page in 1..=6 {
            let id = format!("id{page}");
            mount_page(&server, page, results_html(&[id.as_str()], Some(page + 1))).await;
        }

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let flag = Arc::new(AtomicBool::new(true));
        let collection = ResultCollector::new(&fetcher, &search, "x")
            .with_interrupt(flag)
            .collect()
            .await
            .unwrap();

        assert!(collection.candidates.is_empty());
        assert_eq!(collection.pages_fetched, 0);
        assert_eq!(collection.stop_reason, StopReason::Interrupted);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_between_pages() {
        let server = MockServer::start().await;
        for page in 1..=6 {
            let id = format!("id{page}");
            mount_page(&server, page, results_html(&[id.as_str()], Some(page + 1))).await;
        }

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let flag = Arc::new(AtomicBool::new(false));
        let mut collector =
            ResultCollector::new(&fetcher, &search, "x").with_interrupt(flag.clone());

        let first = collector.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        flag.store(true, Ordering::SeqCst);
        assert!(collector.next_batch().await.unwrap().is_none());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let server = MockServer::start().await;
        mount_page(&server, 1, results_html(&[], None)).await;

        let fetcher = fetcher();
        let search = search_config(&server, 10);
        let collection = ResultCollector::new(&fetcher, &search, "x").collect().await.unwrap();

        assert!(collection.candidates.is_empty());
        assert_eq!(collection.pages_fetched, 1);
        assert_eq!(collection.stop_reason, StopReason::NoNewEntries);
    }
}
