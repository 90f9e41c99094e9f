//! Error types for the ether.
//!
//! A missing key is never an error: reads return `Ok(None)` for the
//! "nothing here yet" case.

use thiserror::Error;

/// Errors surfaced by [`Ether`](crate::Ether) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EtherError {
    /// The stored value is not of the requested type
    #[error("Type mismatch for key '{key}': stored value is not a {expected}")]
    TypeMismatch {
        /// Key that was read
        key: String,
        /// Name of the type the caller asked for
        expected: &'static str,
    },

    /// No Tokio runtime was reachable to schedule an expiry timer
    #[error("Timer unavailable: no Tokio runtime to schedule expiry on")]
    TimerUnavailable,

    /// The store has been shut down and no longer schedules expiry timers
    #[error("Timer service has been shut down")]
    TimerShutdown,
}

impl EtherError {
    /// Returns `true` if this error is a typed read against the wrong type.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, EtherError::TypeMismatch { .. })
    }

    pub(crate) fn type_mismatch<T>(key: &str) -> Self {
        EtherError::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        }
    }
}
