//! Query-string extraction from a path-like header.

use std::collections::BTreeMap;

use tracing::debug;
use url::Url;

/// Placeholder origin the path is resolved against.
pub const PLACEHOLDER_ORIGIN: &str = "https://localhost";

/// Extracts the query parameters of `path` into a flat map.
///
/// When a key repeats, the last occurrence wins. A path that cannot be
/// resolved yields an empty map.
pub fn search_params(path: &str) -> BTreeMap<String, String> {
    let url = match Url::parse(PLACEHOLDER_ORIGIN).and_then(|base| base.join(path)) {
        Ok(url) => url,
        Err(e) => {
            debug!(path, error = %e, "Path could not be resolved, no search params");
            return BTreeMap::new();
        }
    };

    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
