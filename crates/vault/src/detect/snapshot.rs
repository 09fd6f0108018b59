//! Field-level masking of whole records for non-production copies.
//!
//! A [`RecordMasker`] maps field names to [`FieldRule`]s and rewrites a JSON
//! record accordingly. Records pass through untouched when the environment
//! is production.

use std::collections::BTreeMap;

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::{Map, Value};

use super::{keep_last_four, MaskStyle, PiiDetector, MASK_CHAR};

/// Environment name in which records are left as they are.
pub const PRODUCTION: &str = "production";

/// How one field of a record is masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Local part starred out (at most three stars), domain kept.
    Email,
    /// `***` for anything with at least ten digits.
    Phone,
    /// Digits starred out, dashes kept. Anything not SSN-shaped is kept.
    Ssn,
    /// First character kept.
    Name,
    /// Rounded to the nearest hundred.
    Amount,
    /// Last four characters kept.
    Account,
    /// Free text masked in [`MaskStyle::Partial`].
    FreeText,
}

const DEFAULT_RULES: &[(&str, FieldRule)] = &[
    ("email", FieldRule::Email),
    ("phone", FieldRule::Phone),
    ("ssn", FieldRule::Ssn),
    ("first_name", FieldRule::Name),
    ("last_name", FieldRule::Name),
    ("amount", FieldRule::Amount),
    ("balance", FieldRule::Amount),
    ("monthly_income", FieldRule::Amount),
    ("budget_amount", FieldRule::Amount),
    ("account_number", FieldRule::Account),
    ("routing_number", FieldRule::Account),
];

/// Applies [`FieldRule`]s to JSON records.
#[derive(Debug, Clone)]
pub struct RecordMasker {
    environment: String,
    rules: BTreeMap<String, FieldRule>,
    detector: PiiDetector,
}

impl RecordMasker {
    /// Masker with the default rules for user and financial records.
    pub fn for_environment(environment: &str) -> Self {
        Self {
            environment: environment.trim().to_owned(),
            rules: DEFAULT_RULES
                .iter()
                .map(|(field, rule)| ((*field).to_owned(), *rule))
                .collect(),
            detector: PiiDetector::new().with_style(MaskStyle::Partial),
        }
    }

    /// Add or replace the rule for `field`.
    pub fn with_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION)
    }

    pub fn rule(&self, field: &str) -> Option<FieldRule> {
        self.rules.get(field).copied()
    }

    /// Copy of `record` with every ruled field masked. Fields without a rule
    /// and nested values are copied as they are.
    pub fn mask_record(&self, record: &Map<String, Value>) -> Map<String, Value> {
        if self.is_production() {
            return record.clone();
        }
        record
            .iter()
            .map(|(field, value)| {
                let masked = match self.rule(field) {
                    Some(rule) => self.mask_value(rule, value),
                    None => value.clone(),
                };
                (field.clone(), masked)
            })
            .collect()
    }

    /// Apply `rule` to one value. `null` stays `null`.
    pub fn mask_value(&self, rule: FieldRule, value: &Value) -> Value {
        match (rule, value) {
            (_, Value::Null) => Value::Null,
            (FieldRule::Amount, _) => round_amount(value),
            (FieldRule::Account, Value::Number(n)) => mask_account(&n.to_string(), value),
            (FieldRule::Account, Value::String(s)) => mask_account(s, value),
            (FieldRule::Email, Value::String(s)) => Value::String(mask_email(s)),
            (FieldRule::Phone, Value::String(s)) => Value::String(mask_phone(s)),
            (FieldRule::Ssn, Value::String(s)) => Value::String(mask_ssn(s)),
            (FieldRule::Name, Value::String(s)) => Value::String(mask_name(s)),
            (FieldRule::FreeText, Value::String(s)) => Value::String(self.detector.mask(s)),
            _ => value.clone(),
        }
    }
}

fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((user, domain)) => {
            let stars: String = std::iter::repeat(MASK_CHAR)
                .take(user.chars().count().min(3))
                .collect();
            format!("{stars}@{domain}")
        }
        None => email.to_owned(),
    }
}

fn mask_phone(phone: &str) -> String {
    if phone.chars().filter(char::is_ascii_digit).count() < 10 {
        return phone.to_owned();
    }
    "***".to_owned()
}

fn mask_ssn(ssn: &str) -> String {
    let bare = ssn.len() == 9 && ssn.chars().all(|c| c.is_ascii_digit());
    let dashed = ssn.len() == 11 && ssn.matches('-').count() == 2;
    if bare || dashed {
        ssn.chars()
            .map(|c| if c.is_ascii_digit() { MASK_CHAR } else { c })
            .collect()
    } else {
        ssn.to_owned()
    }
}

fn mask_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => std::iter::once(first)
            .chain(chars.map(|_| MASK_CHAR))
            .collect(),
        None => String::new(),
    }
}

fn mask_account(raw: &str, value: &Value) -> Value {
    if raw.chars().count() <= 4 {
        return value.clone();
    }
    Value::String(keep_last_four(raw))
}

/// Round to the nearest hundred, half to even. Numbers stay numbers and
/// numeric strings stay strings; anything unreadable becomes `null` rather
/// than leaking through.
fn round_amount(value: &Value) -> Value {
    let parsed = match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    };
    let Some(amount) = parsed else {
        return Value::Null;
    };
    let rounded = (amount / Decimal::ONE_HUNDRED).round() * Decimal::ONE_HUNDRED;
    match value {
        Value::String(_) => Value::String(rounded.normalize().to_string()),
        _ => rounded
            .to_i64()
            .map(Value::from)
            .unwrap_or_else(|| Value::String(rounded.normalize().to_string())),
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
