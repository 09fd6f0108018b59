//! PII detection and masking for free text.
//!
//! Patterns are applied in a fixed order, most specific first: email, card,
//! SSN, phone, then any remaining long digit run as an account number. A
//! card number is therefore never reported as an account number, and a
//! bare 9-digit run is an SSN. Masking repeats until the text stops
//! changing, so `mask(mask(t)) == mask(t)`.
//!
//! Two [`MaskStyle`]s: fixed `[MASKED_*]` tokens, and partial masks that keep
//! an email's domain or a card's last four digits for non-production copies.
//! [`snapshot::RecordMasker`] applies field-level rules to whole records.
//!
//! Detection is pure and performs no I/O. [`mask`] is the hook used by the
//! log writer in [`crate::telemetry`].

pub mod patterns;
pub mod snapshot;

pub use patterns::{
    keep_last_four, PiiCategory, MASKED_ACCOUNT, MASKED_CARD, MASKED_EMAIL, MASKED_PHONE,
    MASKED_SSN, MASK_CHAR,
};
pub use snapshot::{FieldRule, RecordMasker};

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use patterns::{Pattern, BUILTIN_PATTERNS};

/// Upper bound on masking passes.
const MAX_PASSES: usize = 4;

static DEFAULT_DETECTOR: LazyLock<PiiDetector> = LazyLock::new(PiiDetector::new);

static PARTIAL_DETECTOR: LazyLock<PiiDetector> =
    LazyLock::new(|| PiiDetector::new().with_style(MaskStyle::Partial));

/// Mask `text` with the built-in patterns.
pub fn mask(text: &str) -> String {
    DEFAULT_DETECTOR.mask(text)
}

/// Mask `text` with the built-in patterns in [`MaskStyle::Partial`].
pub fn mask_partial(text: &str) -> String {
    PARTIAL_DETECTOR.mask(text)
}

/// Whether `text` contains anything the built-in patterns match.
pub fn contains_pii(text: &str) -> bool {
    DEFAULT_DETECTOR.contains_pii(text)
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid pattern {name:?}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// The mask token would itself be detected, so masking would never
    /// settle.
    #[error("mask token {token:?} for pattern {name:?} is matched by the {matched_by} pattern")]
    RematchingToken {
        name: String,
        token: String,
        matched_by: String,
    },
}

/// How a finding is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaskStyle {
    /// The category's fixed token, e.g. `[MASKED_CARD]`.
    #[default]
    Token,
    /// Characters starred out, keeping an email's domain, the last four
    /// digits of a card or account, and the punctuation of phones and SSNs.
    Partial,
}

/// A single match reported by [`PiiDetector::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub category: PiiCategory,
    /// Byte range in the scanned text.
    pub range: Range<usize>,
}

/// Ordered set of detection patterns.
#[derive(Debug, Clone)]
pub struct PiiDetector {
    patterns: Vec<Pattern>,
    style: MaskStyle,
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiDetector {
    /// Detector with the built-in patterns only.
    pub fn new() -> Self {
        Self {
            patterns: BUILTIN_PATTERNS.clone(),
            style: MaskStyle::Token,
        }
    }

    pub fn with_style(mut self, style: MaskStyle) -> Self {
        self.style = style;
        self
    }

    pub fn style(&self) -> MaskStyle {
        self.style
    }

    /// Add a pattern applied after every existing one.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::InvalidPattern`] if `pattern` does not compile,
    /// and [`DetectError::RematchingToken`] if `mask_token` would be matched
    /// by any pattern, the new one included.
    pub fn with_custom_pattern(
        mut self,
        name: &str,
        pattern: &str,
        mask_token: &str,
    ) -> Result<Self, DetectError> {
        let regex = Regex::new(pattern).map_err(|source| DetectError::InvalidPattern {
            name: name.to_owned(),
            source,
        })?;
        let candidate = Pattern::new(PiiCategory::Custom(name.to_owned()), regex, mask_token);
        if let Some(hit) = self
            .patterns
            .iter()
            .chain(std::iter::once(&candidate))
            .find(|p| p.finds_in(mask_token))
        {
            return Err(DetectError::RematchingToken {
                name: name.to_owned(),
                token: mask_token.to_owned(),
                matched_by: hit.category.to_string(),
            });
        }
        self.patterns.push(candidate);
        Ok(self)
    }

    pub fn contains_pii(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.finds_in(text))
    }

    /// Replace every finding according to the detector's [`MaskStyle`].
    pub fn mask(&self, text: &str) -> String {
        let mut current = self.mask_pass(text);
        for _ in 1..MAX_PASSES {
            let next = self.mask_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn mask_pass(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for pattern in &self.patterns {
            let replaced = match replace(pattern, &out, self.style) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(s) => s,
            };
            out = replaced;
        }
        out
    }

    /// Every finding in `text`, ordered by position.
    ///
    /// When matches overlap, the pattern applied first wins, the same
    /// precedence [`Self::mask`] uses.
    pub fn scan(&self, text: &str) -> Vec<Finding> {
        let mut findings: Vec<Finding> = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                if !pattern.accepts(m.as_str()) {
                    continue;
                }
                let range = m.range();
                let overlaps = findings
                    .iter()
                    .any(|f| f.range.start < range.end && range.start < f.range.end);
                if !overlaps {
                    findings.push(Finding {
                        category: pattern.category.clone(),
                        range,
                    });
                }
            }
        }
        findings.sort_by_key(|f| f.range.start);
        findings
    }
}

fn replace<'t>(pattern: &Pattern, text: &'t str, style: MaskStyle) -> Cow<'t, str> {
    pattern.regex.replace_all(text, |caps: &Captures<'_>| {
        let matched = &caps[0];
        if !pattern.accepts(matched) {
            return matched.to_owned();
        }
        match style {
            MaskStyle::Token => pattern.mask_token.clone(),
            MaskStyle::Partial => pattern.partial_mask(matched),
        }
    })
}
