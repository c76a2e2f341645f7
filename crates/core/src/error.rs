//! Domain error model.

use thiserror::Error;

/// Rejected domain value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("identity is empty")]
    EmptyIdentity,

    #[error("identity contains control characters")]
    MalformedIdentity,
}
