//! `vault`: field-level protection for personal data.
//!
//! - [`crypto`]: AES-256-GCM-SIV tokens and the rotating [`crypto::KeyRing`].
//! - [`codec`]: typed encrypted values with shadow fields for querying.
//! - [`detect`]: PII detection and masking for free text and logs.
//! - [`audit`]: one aggregated access record per logical operation.
//! - [`server`]: the JSON HTTP service wrapping the above.

pub mod audit;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod detect;
pub mod server;
pub mod telemetry;
