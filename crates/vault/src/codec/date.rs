//! Calendar dates (e.g. date of birth).

use std::convert::Infallible;

use chrono::NaiveDate;

use super::{CodecError, FieldCodec};

const ISO_DATE: &str = "%Y-%m-%d";

/// Encrypted date, stored as ISO-8601 `YYYY-MM-DD`. No shadow.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCodec;

impl FieldCodec for DateCodec {
    type Value = NaiveDate;
    type Shadow = Infallible;
    const KIND: &'static str = "date";

    fn encode_plaintext(&self, value: &NaiveDate) -> Result<String, CodecError> {
        Ok(value.format(ISO_DATE).to_string())
    }

    fn decode_plaintext(&self, plaintext: &str) -> Result<NaiveDate, CodecError> {
        NaiveDate::parse_from_str(plaintext.trim(), ISO_DATE)
            .map_err(|e| CodecError::invalid(Self::KIND, e.to_string()))
    }

    fn format_value(&self, value: &NaiveDate) -> String {
        value.format(ISO_DATE).to_string()
    }
}
