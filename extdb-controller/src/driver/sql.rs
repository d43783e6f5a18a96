//! SQL driver - renders role/database commands and maps SQLSTATE codes.
//!
//! Connections come from a [`Connector`]. Each operation acquires its own
//! [`Session`], runs exactly one statement and releases the session before
//! returning, whatever the outcome. A cancelled operation abandons its
//! session instead of releasing it.

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::identifier::QuotedIdent;
use super::{DriverError, ResourceDriver};

/// SQLSTATE 42710: role already exists.
pub const DUPLICATE_OBJECT: &str = "42710";
/// SQLSTATE 42704: role does not exist.
pub const UNDEFINED_OBJECT: &str = "42704";
/// SQLSTATE 42P04: database already exists.
pub const DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE 3D000: database does not exist.
pub const INVALID_CATALOG_NAME: &str = "3D000";

/// Source of scoped database sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Open (or check out) a session. Failures are [`DriverError::Connection`].
    async fn acquire(&self) -> Result<Self::Session, DriverError>;
}

/// One scoped database session.
#[async_trait]
pub trait Session: Send + Sized {
    /// Run a single statement outside of any transaction.
    async fn execute(&mut self, statement: &str) -> Result<(), DriverError>;

    /// Give the session back.
    async fn release(self);

    /// Give the session back without waiting. Runs instead of
    /// [`Session::release`] when the call owning the session is cancelled,
    /// so it must not block.
    fn abandon(self) {}
}

/// Holds an acquired session until it is released. Dropped early (the
/// surrounding future was cancelled), it abandons the session instead.
struct Scoped<S: Session> {
    session: Option<S>,
}

impl<S: Session> Scoped<S> {
    fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    async fn execute(&mut self, statement: &str) -> Result<(), DriverError> {
        match self.session.as_mut() {
            Some(session) => session.execute(statement).await,
            None => Err(DriverError::Connection(
                "session already released".to_string(),
            )),
        }
    }

    async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.release().await;
        }
    }
}

impl<S: Session> Drop for Scoped<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("Abandoning session of a cancelled call");
            session.abandon();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    CreateRole,
    DropRole,
    CreateDatabase,
    DropDatabase,
}

impl Command {
    fn statement(self, ident: &QuotedIdent) -> String {
        match self {
            Command::CreateRole => format!("CREATE ROLE {ident}"),
            Command::DropRole => format!("DROP ROLE {ident}"),
            Command::CreateDatabase => format!("CREATE DATABASE {ident}"),
            Command::DropDatabase => format!("DROP DATABASE {ident}"),
        }
    }

    /// The one code that means the desired state already holds.
    fn satisfied_code(self) -> &'static str {
        match self {
            Command::CreateRole => DUPLICATE_OBJECT,
            Command::DropRole => UNDEFINED_OBJECT,
            Command::CreateDatabase => DUPLICATE_DATABASE,
            Command::DropDatabase => INVALID_CATALOG_NAME,
        }
    }

    fn object(self) -> &'static str {
        match self {
            Command::CreateRole | Command::DropRole => "Role",
            Command::CreateDatabase | Command::DropDatabase => "Database",
        }
    }

    fn is_create(self) -> bool {
        matches!(self, Command::CreateRole | Command::CreateDatabase)
    }
}

/// [`ResourceDriver`] issuing SQL through a [`Connector`].
pub struct SqlDriver<C> {
    connector: C,
}

impl<C: Connector> SqlDriver<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn execute(&self, command: Command, name: &str) -> Result<(), DriverError> {
        let ident = QuotedIdent::new(name)?;
        let statement = command.statement(&ident);

        let mut session = Scoped::new(self.connector.acquire().await?);
        let result = session.execute(&statement).await;
        session.release().await;

        let object = command.object();
        match result {
            Ok(()) if command.is_create() => {
                info!("{} {} created", object, name);
                Ok(())
            }
            Ok(()) => {
                info!("{} {} dropped", object, name);
                Ok(())
            }
            Err(e) if e.code() == Some(command.satisfied_code()) => {
                if command.is_create() {
                    info!("{} {} already exists", object, name);
                } else {
                    info!("{} {} was already dropped", object, name);
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to run {:?} for {}: {}", command, name, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<C: Connector> ResourceDriver for SqlDriver<C> {
    async fn ensure_role_exists(&self, name: &str) -> Result<(), DriverError> {
        self.execute(Command::CreateRole, name).await
    }

    async fn ensure_role_absent(&self, name: &str) -> Result<(), DriverError> {
        self.execute(Command::DropRole, name).await
    }

    async fn ensure_database_exists(&self, name: &str) -> Result<(), DriverError> {
        self.execute(Command::CreateDatabase, name).await
    }

    async fn ensure_database_absent(&self, name: &str) -> Result<(), DriverError> {
        self.execute(Command::DropDatabase, name).await
    }
}
