//! Fixed-point monetary amounts.
//!
//! Amounts are the one kind with a shadow: the rescaled decimal is stored in
//! plaintext next to the token so rows can be filtered and sorted by amount
//! without decrypting them.

use rust_decimal::Decimal;

use super::{CodecError, FieldCodec};

/// Encrypted fixed-point decimal with a plaintext shadow.
///
/// Values are validated against `max_digits` / `decimal_places` and rendered
/// at exactly `decimal_places` (`12.5` → `"12.50"`).
#[derive(Debug, Clone, Copy)]
pub struct DecimalCodec {
    max_digits: u32,
    decimal_places: u32,
}

impl DecimalCodec {
    /// # Panics
    ///
    /// Panics if `decimal_places > max_digits`.
    pub fn new(max_digits: u32, decimal_places: u32) -> Self {
        assert!(decimal_places <= max_digits, "decimal_places exceeds max_digits");
        Self {
            max_digits,
            decimal_places,
        }
    }

    pub fn max_digits(&self) -> u32 {
        self.max_digits
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }
}

impl Default for DecimalCodec {
    fn default() -> Self {
        Self::new(10, 2)
    }
}

impl FieldCodec for DecimalCodec {
    type Value = Decimal;
    type Shadow = Decimal;
    const KIND: &'static str = "amount";

    fn encode_plaintext(&self, value: &Decimal) -> Result<String, CodecError> {
        let normalized = value.normalize();
        if normalized.scale() > self.decimal_places {
            return Err(CodecError::invalid(
                Self::KIND,
                format!("more than {} decimal places", self.decimal_places),
            ));
        }
        let mut scaled = normalized;
        scaled.rescale(self.decimal_places);
        let digits = scaled.mantissa().unsigned_abs().to_string().len();
        if digits > self.max_digits as usize {
            return Err(CodecError::invalid(
                Self::KIND,
                format!("more than {} digits in total", self.max_digits),
            ));
        }
        Ok(scaled.to_string())
    }

    fn decode_plaintext(&self, plaintext: &str) -> Result<Decimal, CodecError> {
        plaintext
            .trim()
            .parse::<Decimal>()
            .map_err(|e| CodecError::invalid(Self::KIND, e.to_string()))
    }

    fn format_value(&self, value: &Decimal) -> String {
        value.to_string()
    }

    fn shadow(&self, value: &Decimal) -> Option<Decimal> {
        Some(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn encodes_at_fixed_scale() {
        let codec = DecimalCodec::default();
        assert_eq!(codec.encode_plaintext(&dec("12.5")).unwrap(), "12.50");
        assert_eq!(codec.encode_plaintext(&dec("7")).unwrap(), "7.00");
        assert_eq!(codec.encode_plaintext(&dec("-0.10")).unwrap(), "-0.10");
    }

    #[test]
    fn trailing_zeros_do_not_count_as_places() {
        assert_eq!(DecimalCodec::default().encode_plaintext(&dec("3.1000")).unwrap(), "3.10");
    }

    #[test]
    fn rejects_too_many_places() {
        assert!(matches!(
            DecimalCodec::default().encode_plaintext(&dec("1.005")),
            Err(CodecError::InvalidValue { kind: "amount", .. })
        ));
    }

    #[test]
    fn rejects_too_many_digits() {
        let codec = DecimalCodec::new(6, 2);
        assert!(codec.encode_plaintext(&dec("9999.99")).is_ok());
        assert!(codec.encode_plaintext(&dec("10000.00")).is_err());
    }

    #[test]
    fn decode_rejects_non_numbers() {
        assert!(DecimalCodec::default().decode_plaintext("twelve").is_err());
    }

    #[test]
    fn shadow_is_identity() {
        assert_eq!(DecimalCodec::default().shadow(&dec("4.20")), Some(dec("4.20")));
    }
}
