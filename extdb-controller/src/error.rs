//! Error types for reconciliation.

use thiserror::Error;

pub use crate::driver::DriverError;
pub use crate::store::StoreError;

/// Why a delivery failed. Every variant asks for redelivery unless
/// [`ReconcileError::is_retryable`] says otherwise.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("driver: {0}")]
    Driver(#[from] DriverError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// The controller shut down while the delivery was in flight.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Driver(e) => e.is_retryable(),
            ReconcileError::Store(_) | ReconcileError::Cancelled => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
