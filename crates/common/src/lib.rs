//! Wire types and errors shared by the `pii-vault` service and its callers.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
