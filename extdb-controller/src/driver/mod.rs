//! Resource drivers.
//!
//! A driver applies idempotent create/drop operations to the database server:
//! - roles: backing `DatabaseUser` objects
//! - databases: backing `Database` objects
//!
//! "Already exists" on create and "does not exist" on drop are folded into
//! success. Every other failure is surfaced unmodified.

pub mod identifier;
pub mod postgres;
pub mod sql;

use async_trait::async_trait;
use thiserror::Error;

pub use identifier::QuotedIdent;
pub use postgres::{PgConnector, PgPoolConnector};
pub use sql::{Connector, Session, SqlDriver};

/// SQLSTATE codes that no retry can fix.
const PERMANENT_CODES: &[&str] = &[
    "42602", // invalid_name
    "42622", // name_too_long
];

/// Errors surfaced by a resource driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The database server could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The command ran but failed for a reason other than the idempotent cases.
    #[error("operation failed [{}]: {message}", .code.as_deref().unwrap_or("no code"))]
    Operation {
        code: Option<String>,
        message: String,
    },

    /// The resource name cannot be used as an identifier.
    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },
}

impl DriverError {
    /// SQLSTATE reported by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            DriverError::Operation { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether redelivering the request can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DriverError::Connection(_) => true,
            DriverError::InvalidIdentifier { .. } => false,
            DriverError::Operation { code, .. } => code
                .as_deref()
                .is_none_or(|c| !PERMANENT_CODES.contains(&c)),
        }
    }
}

/// Idempotent operations against the database server.
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    /// Create the role unless it already exists.
    async fn ensure_role_exists(&self, name: &str) -> Result<(), DriverError>;

    /// Drop the role unless it is already gone.
    async fn ensure_role_absent(&self, name: &str) -> Result<(), DriverError>;

    /// Create the database unless it already exists.
    async fn ensure_database_exists(&self, name: &str) -> Result<(), DriverError>;

    /// Drop the database unless it is already gone.
    async fn ensure_database_absent(&self, name: &str) -> Result<(), DriverError>;
}
