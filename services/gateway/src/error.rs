//! Service-level error taxonomy.
//!
//! Component failures funnel into a small set of outcomes the HTTP boundary
//! can map to status codes. Identity failures arrive pre-collapsed (the
//! verifier never distinguishes causes to callers); pipeline and store
//! failures keep their message for logging and the error body.

use crate::auth::AuthError;
use crate::entry_store::EntryStoreError;
use crate::media_pipeline::PipelineError;
use thiserror::Error;

/// Request-level failure outcomes
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("media synthesis failed: {0}")]
    TranscodeFailed(String),

    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("entry not found")]
    EntryNotFound,
}

impl From<AuthError> for ServiceError {
    fn from(_: AuthError) -> Self {
        // MissingToken and every validation failure look the same to callers
        ServiceError::Unauthorized
    }
}

impl From<PipelineError> for ServiceError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoFile => ServiceError::Validation("no file provided".to_string()),
            PipelineError::Transcode(e) => ServiceError::TranscodeFailed(e.to_string()),
            // Scratch space is part of the synthesis step
            PipelineError::Scratch(e) => ServiceError::TranscodeFailed(e),
            PipelineError::Store(e) => ServiceError::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<EntryStoreError> for ServiceError {
    fn from(err: EntryStoreError) -> Self {
        ServiceError::StoreUnavailable(err.to_string())
    }
}
