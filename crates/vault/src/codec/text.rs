//! Free text and email addresses.

use std::convert::Infallible;
use std::sync::LazyLock;

use regex::Regex;

use super::{CodecError, FieldCodec};

static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("email shape regex is valid")
});

/// Opaque text, stored exactly as given. No shadow.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl FieldCodec for TextCodec {
    type Value = String;
    type Shadow = Infallible;
    const KIND: &'static str = "text";

    fn encode_plaintext(&self, value: &String) -> Result<String, CodecError> {
        Ok(value.clone())
    }

    fn decode_plaintext(&self, plaintext: &str) -> Result<String, CodecError> {
        Ok(plaintext.to_owned())
    }

    fn format_value(&self, value: &String) -> String {
        value.clone()
    }
}

/// Email address, trimmed and lowercased before encryption so equal
/// addresses always decrypt to the same canonical text. No shadow.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailCodec;

impl FieldCodec for EmailCodec {
    type Value = String;
    type Shadow = Infallible;
    const KIND: &'static str = "email";

    fn encode_plaintext(&self, value: &String) -> Result<String, CodecError> {
        let canonical = value.trim().to_lowercase();
        if canonical.is_empty() {
            return Ok(canonical);
        }
        if !EMAIL_SHAPE.is_match(&canonical) {
            return Err(CodecError::invalid(Self::KIND, "not a valid email address"));
        }
        Ok(canonical)
    }

    fn decode_plaintext(&self, plaintext: &str) -> Result<String, CodecError> {
        Ok(plaintext.to_owned())
    }

    fn format_value(&self, value: &String) -> String {
        value.clone()
    }
}
