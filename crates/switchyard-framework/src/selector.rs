//! Header-driven selection of a routing target.
//!
//! A [`Selector`] reads one processed header and picks an entry from a
//! marker-keyed table. Without a pattern the header value is the marker.
//! With a pattern the first capture group is the marker, and on a hit the
//! matched text is consumed from the header so that nested nodes see only
//! what remains.
//!
//! The empty marker `""` is the default entry, used when nothing else fits.
//!
//! ```text
//! field = "path", pattern = "^([a-z]+)/"
//!
//!   "users/123"  ──▶ capture "users" ──▶ Matched { remainder: "123" }
//!   "other/1"    ──▶ capture "other" (no entry) ──▶ Default, header untouched
//!   "123"        ──▶ no match ──▶ Rejected
//! ```

use std::collections::HashMap;

use regex::Regex;
use tracing::trace;

use switchyard_core::{SetupError, SetupResult};

/// The marker of the default entry.
pub const DEFAULT_MARKER: &str = "";

/// Outcome of a selection.
#[derive(Debug)]
pub enum Selection<'r, T> {
    /// An entry other than the default matched.
    Matched {
        /// The selected entry.
        target: &'r T,
        /// The marker it is registered under.
        marker: String,
        /// The header value with the matched text removed, when a pattern
        /// consumed part of it.
        remainder: Option<String>,
    },
    /// No specific entry matched; the default entry was chosen.
    Default(&'r T),
    /// No specific entry matched and there is no default entry.
    Unmatched,
    /// A pattern is configured and the header value does not match it.
    Rejected {
        /// The offending header value.
        value: String,
    },
}

impl<'r, T> Selection<'r, T> {
    /// The selected entry, if any.
    pub fn target(&self) -> Option<&'r T> {
        match self {
            Self::Matched { target, .. } => Some(target),
            Self::Default(target) => Some(target),
            Self::Unmatched | Self::Rejected { .. } => None,
        }
    }
}

/// Picks a routing target from a header.
#[derive(Debug, Clone)]
pub struct Selector {
    field: String,
    pattern: Option<Regex>,
}

impl Selector {
    /// Selects on the exact value of `field`.
    pub fn new(field: impl Into<String>) -> SetupResult<Self> {
        let field = field.into();
        if field.is_empty() {
            return Err(SetupError::MissingSelectorField);
        }
        Ok(Self {
            field: field.to_ascii_lowercase(),
            pattern: None,
        })
    }

    /// Selects on the first capture group of `pattern` matched against
    /// `field`.
    pub fn with_pattern(field: impl Into<String>, pattern: &str) -> SetupResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| SetupError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_regex(field, regex)
    }

    /// Like [`with_pattern`](Self::with_pattern) with a compiled pattern.
    ///
    /// The pattern must have exactly one capturing group.
    pub fn from_regex(field: impl Into<String>, pattern: Regex) -> SetupResult<Self> {
        // captures_len counts the implicit group of the whole match
        let groups = pattern.captures_len() - 1;
        if groups != 1 {
            return Err(SetupError::CaptureGroupCount {
                pattern: pattern.as_str().to_string(),
                groups,
            });
        }
        let mut selector = Self::new(field)?;
        selector.pattern = Some(pattern);
        Ok(selector)
    }

    /// The header this selector reads.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The pattern, if one is configured.
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Picks the entry of `routes` for the header value `value`.
    pub fn select<'r, T>(&self, routes: &'r HashMap<String, T>, value: &str) -> Selection<'r, T> {
        let Some(pattern) = &self.pattern else {
            if let Some(target) = routes.get(value).filter(|_| value != DEFAULT_MARKER) {
                return Selection::Matched {
                    target,
                    marker: value.to_string(),
                    remainder: None,
                };
            }
            return self.fall_back(routes);
        };

        let Some(captures) = pattern.captures(value) else {
            trace!(field = %self.field, value, "Selector pattern did not match");
            return Selection::Rejected {
                value: value.to_string(),
            };
        };

        let marker = captures.get(1).map_or("", |m| m.as_str());
        match routes.get(marker).filter(|_| marker != DEFAULT_MARKER) {
            Some(target) => {
                let whole = captures.get(0).map_or(0..0, |m| m.range());
                let remainder = format!("{}{}", &value[..whole.start], &value[whole.end..]);
                trace!(field = %self.field, marker, %remainder, "Selector consumed header");
                Selection::Matched {
                    target,
                    marker: marker.to_string(),
                    remainder: Some(remainder),
                }
            }
            None => self.fall_back(routes),
        }
    }

    fn fall_back<'r, T>(&self, routes: &'r HashMap<String, T>) -> Selection<'r, T> {
        match routes.get(DEFAULT_MARKER) {
            Some(target) => Selection::Default(target),
            None => Selection::Unmatched,
        }
    }
}
