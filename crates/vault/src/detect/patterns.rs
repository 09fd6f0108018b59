//! Built-in PII patterns, most specific first.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

pub const MASKED_EMAIL: &str = "[MASKED_EMAIL]";
pub const MASKED_CARD: &str = "[MASKED_CARD]";
pub const MASKED_SSN: &str = "[MASKED_SSN]";
pub const MASKED_PHONE: &str = "[MASKED_PHONE]";
pub const MASKED_ACCOUNT: &str = "[MASKED_ACCOUNT]";

/// Character that stands in for hidden characters in partial masks.
pub const MASK_CHAR: char = '*';

/// Digit count an international number must have, country code included.
const INTERNATIONAL_PHONE_DIGITS: RangeInclusive<usize> = 10..=15;

/// What a pattern detects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PiiCategory {
    Email,
    CreditCard,
    Ssn,
    Phone,
    AccountNumber,
    /// Added with [`super::PiiDetector::with_custom_pattern`].
    Custom(String),
}

impl PiiCategory {
    pub fn name(&self) -> &str {
        match self {
            Self::Email => "email",
            Self::CreditCard => "credit_card",
            Self::Ssn => "ssn",
            Self::Phone => "phone",
            Self::AccountNumber => "account_number",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One detection rule: a regex, the token that replaces its matches, and an
/// optional bound on how many digits a match may contain.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub(super) category: PiiCategory,
    pub(super) regex: Regex,
    pub(super) mask_token: String,
    pub(super) digit_count: Option<RangeInclusive<usize>>,
}

impl Pattern {
    pub(super) fn new(category: PiiCategory, regex: Regex, mask_token: impl Into<String>) -> Self {
        Self {
            category,
            regex,
            mask_token: mask_token.into(),
            digit_count: None,
        }
    }

    fn builtin(category: PiiCategory, pattern: &str, mask_token: &str) -> Self {
        Self::new(
            category,
            Regex::new(pattern).expect("invalid built-in PII pattern"),
            mask_token,
        )
    }

    fn with_digit_count(mut self, bounds: RangeInclusive<usize>) -> Self {
        self.digit_count = Some(bounds);
        self
    }

    /// Whether a regex match is a real finding for this pattern.
    pub(super) fn accepts(&self, matched: &str) -> bool {
        match &self.digit_count {
            Some(bounds) => bounds.contains(&matched.chars().filter(char::is_ascii_digit).count()),
            None => true,
        }
    }
    /// Whether `text` holds at least one finding for this pattern.
    pub(super) fn finds_in(&self, text: &str) -> bool {
        self.regex.find_iter(text).any(|m| self.accepts(m.as_str()))
    }

    /// Replacement that hides a match but keeps what support staff need to
    /// recognise it: an email's domain, the last four digits of a card or
    /// account number, the layout of a phone number or SSN. Custom patterns
    /// fall back to their token.
    pub(super) fn partial_mask(&self, matched: &str) -> String {
        match self.category {
            PiiCategory::Email => match matched.split_once('@') {
                Some((user, domain)) => {
                    format!("{}@{domain}", stars(user.chars().count().min(3)))
                }
                None => self.mask_token.clone(),
            },
            PiiCategory::CreditCard => {
                let digits: String = matched.chars().filter(char::is_ascii_digit).collect();
                let hidden = digits.len().saturating_sub(4);
                let last_four = &digits[hidden..];
                if matched.contains('-') {
                    format!("****-****-****-{last_four}")
                } else if matched.contains(char::is_whitespace) {
                    format!("**** **** **** {last_four}")
                } else {
                    format!("{}{last_four}", stars(hidden))
                }
            }
            PiiCategory::Ssn | PiiCategory::Phone => matched
                .chars()
                .map(|c| if c.is_ascii_digit() { MASK_CHAR } else { c })
                .collect(),
            PiiCategory::AccountNumber => keep_last_four(matched),
            PiiCategory::Custom(_) => self.mask_token.clone(),
        }
    }
}

fn stars(n: usize) -> String {
    std::iter::repeat(MASK_CHAR).take(n).collect()
}

/// `value` with every character but the last four replaced by [`MASK_CHAR`].
pub fn keep_last_four(value: &str) -> String {
    let count = value.chars().count();
    let hidden = count.saturating_sub(4);
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < hidden { MASK_CHAR } else { c })
        .collect()
}

pub(super) static BUILTIN_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        Pattern::builtin(
            PiiCategory::Email,
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            MASKED_EMAIL,
        ),
        // Visa, Mastercard, Amex, Discover; optional dash or space separators.
        Pattern::builtin(
            PiiCategory::CreditCard,
            r"\b(?:4\d{3}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}|5[1-5]\d{2}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}|3[47]\d{2}[-\s]?\d{6}[-\s]?\d{5}|6(?:011|5\d{2})[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4})\b",
            MASKED_CARD,
        ),
        Pattern::builtin(PiiCategory::Ssn, r"\b(?:\d{3}-\d{2}-\d{4}|\d{9})\b", MASKED_SSN),
        Pattern::builtin(
            PiiCategory::Phone,
            r"\+\d{1,3}[-.\s]?(?:\d{1,4}[-.\s]?){1,4}\d{1,4}\b",
            MASKED_PHONE,
        )
        .with_digit_count(INTERNATIONAL_PHONE_DIGITS),
        // North American: optional +1 / 1, area code with or without parens.
        Pattern::builtin(
            PiiCategory::Phone,
            r"(?:\+1[-.\s]?|\b1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b",
            MASKED_PHONE,
        ),
        Pattern::builtin(PiiCategory::AccountNumber, r"\b\d{9,}\b", MASKED_ACCOUNT),
    ]
});
