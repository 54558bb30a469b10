use std::collections::HashSet;

use url::Url;

use crate::document::Document;

/// Same-host link targets of `document` that are not in `visited`, in
/// document order. Only the host is compared; scheme and port may differ.
pub fn extract_links<'a>(
    document: &'a Document,
    origin: &'a Url,
    visited: &'a HashSet<String>,
) -> impl Iterator<Item = String> + 'a {
    document
        .elements_named(document.root(), "a")
        .filter_map(move |anchor| document.attr(anchor, "href"))
        .filter_map(move |href| origin.join(href.trim()).ok())
        .filter(move |url| url.host_str().is_some() && url.host_str() == origin.host_str())
        .map(String::from)
        .filter(move |url| !visited.contains(url))
}
