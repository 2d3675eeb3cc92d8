//! Error taxonomy shared by the HTTP server and the CLI.
//!
//! Three families matter to callers:
//!
//! - input problems ([`IntakeError::Invalid`], [`IntakeError::PayloadTooLarge`]),
//!   raised before any store access;
//! - store-access failures ([`IntakeError::StoreUnavailable`]), always
//!   retryable and never reported as "no duplicates";
//! - state problems ([`IntakeError::NotFound`], [`IntakeError::Conflict`]).
//!
//! Replacement partial failures are not errors here: they travel as
//! [`ReplaceOutcome`](paper_intake_core::replace::ReplaceOutcome) values so
//! they cannot be confused with a clean failure.

use paper_intake_core::replace::ReplaceError;
use paper_intake_core::resolver::ResolveError;
use paper_intake_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    Invalid(String),

    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IntakeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        IntakeError::Invalid(message.into())
    }
}

impl From<StoreError> for IntakeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => IntakeError::NotFound(id),
            StoreError::Conflict(msg) => IntakeError::Conflict(msg),
            StoreError::Backend(e) => IntakeError::StoreUnavailable(format!("{:#}", e)),
        }
    }
}

impl From<ResolveError> for IntakeError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Invalid(msg) => IntakeError::Invalid(msg),
            ResolveError::Store(e) => e.into(),
        }
    }
}

impl From<ReplaceError> for IntakeError {
    fn from(err: ReplaceError) -> Self {
        match err {
            ReplaceError::Invalid(msg) => IntakeError::Invalid(msg),
            ReplaceError::NotFound(id) => IntakeError::NotFound(id),
            e @ ReplaceError::ProjectMismatch { .. } => IntakeError::Invalid(e.to_string()),
            ReplaceError::Store(e) => e.into(),
        }
    }
}
