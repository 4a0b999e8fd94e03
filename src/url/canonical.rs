use crate::url::CandidateReference;
use url::Url;

/// Query parameter carrying the stable per-label identifier
const IDENTIFIER_PARAM: &str = "setid";

/// Path marker of label detail pages
const LABEL_PATH_MARKER: &str = "lookup.cfm";

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs or non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Derives a candidate reference from a search-result link
///
/// Only links to label pages qualify (`lookup.cfm` or a `setid` parameter).
/// The canonical identifier comes from the link's `setid` value, never from
/// the anchor text, and the returned URL keeps scheme, host, port, and path
/// with the query reduced to `setid=<value>`. Differently parameterized links
/// to the same label therefore collapse to one reference.
///
/// # Examples
///
/// ```
/// use label_sieve::url::canonical_reference;
/// use url::Url;
///
/// let base = Url::parse("https://dailymed.nlm.nih.gov/dailymed/search.cfm").unwrap();
/// let reference = canonical_reference(
///     "/dailymed/lookup.cfm?setid=ABC-123&audience=consumer#top",
///     &base,
/// )
/// .unwrap();
/// assert_eq!(reference.canonical_id, "abc-123");
/// assert_eq!(
///     reference.url,
///     "https://dailymed.nlm.nih.gov/dailymed/lookup.cfm?setid=ABC-123"
/// );
/// ```
pub fn canonical_reference(href: &str, base_url: &Url) -> Option<CandidateReference> {
    if !href.contains(LABEL_PATH_MARKER) && !href.contains(IDENTIFIER_PARAM) {
        return None;
    }

    let mut url = resolve_link(href, base_url)?;

    let setid = url
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case(IDENTIFIER_PARAM))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair(IDENTIFIER_PARAM, &setid);

    Some(CandidateReference {
        canonical_id: setid.to_lowercase(),
        url: url.to_string(),
    })
}
