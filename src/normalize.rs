//! Canonical field normalization.
//!
//! Upstream producers spell the archive-location field in many ways
//! (`archivedPath`, `archiveFolderPath`, `Archived-Path`, ...). The
//! [`KeyNormalizer`] renames whichever variant a document carries to the
//! canonical name so that every stored document can be located the same way.
//!
//! # Matching
//!
//! The recognition pattern is case-insensitive and unanchored: a field
//! qualifies if the pattern matches anywhere in its name. When several fields
//! qualify, the lexicographically smallest name wins and every other
//! candidate is dropped, so the result never depends on map iteration order.

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::error::{NormalizationError, PolicyError};
use crate::models::Document;

/// Field name every stored document must carry.
pub const DEFAULT_CANONICAL_FIELD: &str = "archived_path";

/// Recognizes misnamed variants of [`DEFAULT_CANONICAL_FIELD`].
pub const DEFAULT_RECOGNITION_PATTERN: &str = "archive.*path";

/// The canonical field name plus the pattern that recognizes its variants.
#[derive(Debug, Clone)]
pub struct CanonicalFieldPolicy {
    canonical: String,
    pattern: Regex,
}

impl CanonicalFieldPolicy {
    /// Builds a policy. The pattern must match the canonical name itself,
    /// otherwise a document already carrying the canonical field could be
    /// treated as unrecognized.
    pub fn new(canonical: impl Into<String>, pattern: &str) -> Result<Self, PolicyError> {
        let canonical = canonical.into();
        let regex = build_pattern(pattern).map_err(|source| PolicyError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        if !regex.is_match(&canonical) {
            return Err(PolicyError::CanonicalNotRecognized {
                canonical,
                pattern: pattern.to_string(),
            });
        }

        Ok(Self {
            canonical,
            pattern: regex,
        })
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// True if `field` is a misnamed variant of the canonical field.
    pub fn recognizes(&self, field: &str) -> bool {
        field != self.canonical && self.pattern.is_match(field)
    }
}

impl Default for CanonicalFieldPolicy {
    fn default() -> Self {
        Self {
            canonical: DEFAULT_CANONICAL_FIELD.to_string(),
            pattern: build_pattern(DEFAULT_RECOGNITION_PATTERN)
                .expect("default recognition pattern compiles"),
        }
    }
}

fn build_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Rewrites a document's path-identifying field to its canonical name.
#[derive(Debug, Clone, Default)]
pub struct KeyNormalizer {
    policy: CanonicalFieldPolicy,
}

impl KeyNormalizer {
    pub fn new(policy: CanonicalFieldPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CanonicalFieldPolicy {
        &self.policy
    }

    /// Normalizes `doc` in place.
    ///
    /// A document that already carries the canonical field is left untouched.
    /// Otherwise the winning candidate's value moves to the canonical name at
    /// the candidate's position, and all other candidates are removed.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError`] when no field is recognized. The
    /// document is unchanged in that case.
    pub fn normalize(&self, doc: &mut Document) -> Result<(), NormalizationError> {
        let canonical = self.policy.canonical_name();
        if doc.contains_key(canonical) {
            return Ok(());
        }

        let winner = match doc.keys().filter(|k| self.policy.recognizes(k)).min() {
            Some(key) => key.clone(),
            None => {
                return Err(NormalizationError {
                    canonical: canonical.to_string(),
                })
            }
        };

        let fields = std::mem::take(doc);
        for (key, value) in fields {
            if key == winner {
                debug!(from = %key, to = canonical, "renamed canonical field");
                doc.insert(canonical.to_string(), value);
            } else if self.policy.recognizes(&key) {
                warn!(field = %key, kept = %winner, "dropped competing canonical field candidate");
            } else {
                doc.insert(key, value);
            }
        }

        Ok(())
    }
}
