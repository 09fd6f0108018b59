//! Phone numbers, normalized to E.164 before encryption.

use std::convert::Infallible;

use super::{CodecError, FieldCodec};

/// Shortest and longest accepted digit counts, country code included.
const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Encrypted phone number.
///
/// Input such as `(555) 123-4567`, `555.123.4567` or `+1 555 123 4567` is
/// normalized to `+15551234567`. Numbers without a `+` or `00` prefix are
/// taken to be national numbers under `default_country_code`. No shadow.
#[derive(Debug, Clone)]
pub struct PhoneCodec {
    default_country_code: String,
}

impl PhoneCodec {
    pub fn new(default_country_code: impl Into<String>) -> Self {
        Self {
            default_country_code: default_country_code.into(),
        }
    }

    /// Canonical `+<digits>` form of `raw`, or an empty string if `raw` is
    /// blank.
    pub fn normalize(&self, raw: &str) -> Result<String, CodecError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(CodecError::invalid(Self::KIND, "contains no digits"));
        }

        let cc = &self.default_country_code;
        let international = if trimmed.starts_with('+') {
            digits
        } else if let Some(rest) = digits.strip_prefix("00") {
            rest.to_owned()
        } else if digits.len() == 10 {
            format!("{cc}{digits}")
        } else if digits.len() == cc.len() + 10 && digits.starts_with(cc.as_str()) {
            digits
        } else {
            return Err(CodecError::invalid(
                Self::KIND,
                "cannot determine country code; use +<country><number>",
            ));
        };

        if !(MIN_DIGITS..=MAX_DIGITS).contains(&international.len()) {
            return Err(CodecError::invalid(
                Self::KIND,
                format!("must have {MIN_DIGITS} to {MAX_DIGITS} digits"),
            ));
        }
        Ok(format!("+{international}"))
    }
}

impl Default for PhoneCodec {
    fn default() -> Self {
        Self::new("1")
    }
}

impl FieldCodec for PhoneCodec {
    type Value = String;
    type Shadow = Infallible;
    const KIND: &'static str = "phone";

    fn encode_plaintext(&self, value: &String) -> Result<String, CodecError> {
        self.normalize(value)
    }

    fn decode_plaintext(&self, plaintext: &str) -> Result<String, CodecError> {
        Ok(plaintext.to_owned())
    }

    fn format_value(&self, value: &String) -> String {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn national_formats_share_one_canonical_form() {
        let codec = PhoneCodec::default();
        for raw in ["(555) 123-4567", "555.123.4567", "5551234567", "+1 555 123 4567", "1-555-123-4567"] {
            assert_eq!(codec.normalize(raw).unwrap(), "+15551234567", "input {raw}");
        }
    }

    #[test]
    fn international_prefixes() {
        let codec = PhoneCodec::default();
        assert_eq!(codec.normalize("+44 20 7946 0958").unwrap(), "+442079460958");
        assert_eq!(codec.normalize("0044 20 7946 0958").unwrap(), "+442079460958");
    }

    #[test]
    fn other_default_country() {
        let codec = PhoneCodec::new("49");
        assert!(codec.normalize("030 1234 5678").is_err());
        assert_eq!(codec.normalize("3012345678").unwrap(), "+493012345678");
    }

    #[test]
    fn rejects_short_numbers() {
        assert!(PhoneCodec::default().normalize("+1 555 0100").is_err());
        assert!(PhoneCodec::default().normalize("123-4567").is_err());
    }

    #[test]
    fn blank_is_empty() {
        assert_eq!(PhoneCodec::default().normalize("   ").unwrap(), "");
    }

    #[test]
    fn text_without_digits_is_rejected() {
        for raw in ["n/a", "call me maybe"] {
            assert!(matches!(
                PhoneCodec::default().normalize(raw),
                Err(CodecError::InvalidValue { kind: "phone", .. })
            ));
        }
    }
}
