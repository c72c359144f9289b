//! Fatal pull-loop error.

use std::fmt;

use crate::transport::TransportError;

/// A chunk request failed; the pull of `resource` stopped at `offset`.
/// Chunks before `offset` were already delivered and stay valid.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub resource: String,
    pub offset: u64,
    pub cause: TransportError,
}

impl FetchError {
    pub fn new(resource: impl Into<String>, offset: u64, cause: TransportError) -> Self {
        Self {
            resource: resource.into(),
            offset,
            cause,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetch of {} failed at offset {}: {}",
            self.resource, self.offset, self.cause
        )
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
