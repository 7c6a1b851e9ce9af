//! Federation error types.

#![allow(missing_docs)]

use thiserror::Error;

/// Failure delivering to a single inbox.
///
/// Collected per recipient in a [`crate::DeliveryReport`]; never propagated
/// out of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Invalid inbox URL: {0}")]
    InvalidInbox(String),

    #[error("Delivery rejected: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl DeliveryError {
    /// Whether a later attempt could succeed.
    ///
    /// Client errors other than timeouts and rate limiting are permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::InvalidInbox(_) | Self::Signing(_) => false,
        }
    }
}

/// Failure fetching a remote actor profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Remote actor not found: {0}")]
    NotFound(String),

    #[error("Invalid actor document: {0}")]
    Invalid(String),

    #[error("Fetch failed: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DeliveryError::Transport("timeout".to_string()).is_retryable());
        assert!(
            DeliveryError::Rejected {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            DeliveryError::Rejected {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DeliveryError::Rejected {
                status: 401,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!DeliveryError::InvalidInbox("x".to_string()).is_retryable());
    }
}
