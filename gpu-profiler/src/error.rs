//! Error types for counter sampling

use crate::backend::{BackendError, CounterId, ProfileId};
use std::panic::Location;
use thiserror::Error;

/// Errors produced by samplers, the registry and the report driver
#[derive(Debug, Error)]
pub enum SamplerError {
    /// A backend call failed
    #[error("[{location}] {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        location: String,
        #[source]
        source: BackendError,
    },

    /// A cached profile has no recorded size
    #[error("profile {0} not found in profile size cache")]
    MissingProfileSize(ProfileId),

    /// A record references a counter the device did not report
    #[error("counter {0} not found in supported counter set")]
    UnknownCounter(CounterId),

    /// Discovery found no GPU devices
    #[error("no GPU devices found")]
    NoDevices,
}

pub type Result<T> = std::result::Result<T, SamplerError>;

/// Tag a backend result with the operation name and the caller's location
#[track_caller]
pub(crate) fn check<T>(operation: &'static str, result: crate::backend::BackendResult<T>) -> Result<T> {
    let caller = Location::caller();
    result.map_err(|source| SamplerError::Backend {
        operation,
        location: format!("{}:{}", caller.file(), caller.line()),
        source,
    })
}
