//! Structured logging and optional OpenTelemetry span export.
//!
//! Every formatted log line is passed through [`crate::detect::mask`] before
//! it reaches stdout, so a stray email or card number in a message or field
//! is replaced by a mask token.
//!
//! # Telemetry invariants
//!
//! - **No key material** appears in any log field or span attribute; keys
//!   are identified by fingerprint only.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;
pub mod masking;

pub use init::init_telemetry;
pub use masking::{MaskingMakeWriter, MaskingWriter};
