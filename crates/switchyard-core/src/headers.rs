//! Header sets exchanged with the transport.
//!
//! Multiplexed transports deliver headers as a flat name/value set in which
//! the request line is carried by pseudo-headers (`:method`, `:path`, ...).
//! [`Headers`] keeps that shape: names are stored lower-cased and pseudo
//! headers are ordinary entries.

use std::collections::BTreeMap;
use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};

/// Well-known header names.
pub mod names {
    pub const AUTHORITY: &str = ":authority";
    pub const METHOD: &str = ":method";
    pub const PATH: &str = ":path";
    pub const SCHEME: &str = ":scheme";
    pub const STATUS: &str = ":status";

    pub const ACCEPT_ENCODING: &str = "accept-encoding";
    pub const CONTENT_ENCODING: &str = "content-encoding";
    pub const CONTENT_TYPE: &str = "content-type";

    pub const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "access-control-allow-origin";
    pub const ACCESS_CONTROL_ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    pub const ACCESS_CONTROL_ALLOW_HEADERS: &str = "access-control-allow-headers";
    pub const ACCESS_CONTROL_ALLOW_METHODS: &str = "access-control-allow-methods";
}

/// Transport flags delivered alongside an exchange's headers.
///
/// They are passed through the routing tree untouched.
pub type StreamFlags = u32;

/// A set of headers keyed by lower-cased name.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    entries: BTreeMap<String, String>,
}

impl Headers {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(&name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Inserts a header, returning the previous value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&name.to_ascii_lowercase())
    }

    /// Returns `true` if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Copies every entry of `other` into this set; `other` wins on conflicts.
    pub fn extend_from(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.entries.insert(name.to_string(), value.to_string());
        }
    }

    /// The `:path` pseudo-header.
    pub fn path(&self) -> Option<&str> {
        self.get(names::PATH)
    }

    /// The `:method` pseudo-header, parsed.
    ///
    /// Returns `None` when the header is absent or not a valid method token.
    pub fn method(&self) -> Option<Method> {
        self.get(names::METHOD)
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");

        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert!(headers.contains(names::CONTENT_TYPE));
    }

    #[test]
    fn pseudo_headers() {
        let headers = Headers::from([(":method", "OPTIONS"), (":path", "/a?b=1")]);

        assert_eq!(headers.method(), Some(Method::OPTIONS));
        assert_eq!(headers.path(), Some("/a?b=1"));
    }

    #[test]
    fn extend_overrides_existing() {
        let mut base = Headers::from([("a", "1"), ("b", "2")]);
        base.extend_from(&Headers::from([("b", "3")]));

        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(base.get("b"), Some("3"));
    }
}
