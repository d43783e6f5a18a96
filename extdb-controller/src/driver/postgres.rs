//! PostgreSQL connectors backed by sqlx.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Executor, Postgres};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::DriverError;
use super::sql::{Connector, Session};

/// Opens a fresh connection per operation and closes it afterwards.
pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Session = PgSession;

    async fn acquire(&self) -> Result<PgSession, DriverError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;
        debug!("Opened database connection");
        Ok(PgSession(conn))
    }
}

pub struct PgSession(PgConnection);

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, statement: &str) -> Result<(), DriverError> {
        Executor::execute(&mut self.0, sqlx::raw_sql(statement))
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn release(self) {
        close(self.0).await;
    }

    fn abandon(self) {
        // Finish the close in the background; outside a runtime just drop it.
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(close(self.0));
        }
    }
}

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!("Error closing database connection: {}", e);
    } else {
        debug!("Closed database connection");
    }
}

/// Checks connections out of a lazily filled pool. Same contract as
/// [`PgConnector`]; releasing a session returns it to the pool.
pub struct PgPoolConnector {
    pool: PgPool,
}

impl PgPoolConnector {
    pub fn new(options: PgConnectOptions, max_connections: u32) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy_with(options);
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Connector for PgPoolConnector {
    type Session = PgPoolSession;

    async fn acquire(&self) -> Result<PgPoolSession, DriverError> {
        self.pool
            .acquire()
            .await
            .map(PgPoolSession)
            .map_err(|e| DriverError::Connection(e.to_string()))
    }
}

pub struct PgPoolSession(PoolConnection<Postgres>);

#[async_trait]
impl Session for PgPoolSession {
    async fn execute(&mut self, statement: &str) -> Result<(), DriverError> {
        Executor::execute(&mut *self.0, sqlx::raw_sql(statement))
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn release(self) {
        drop(self.0);
    }
}

/// Translate a sqlx error into the driver taxonomy. Server-reported errors keep
/// their SQLSTATE so the caller can recognise the idempotent cases.
fn map_error(e: sqlx::Error) -> DriverError {
    match e {
        sqlx::Error::Database(db) => DriverError::Operation {
            code: db.code().map(|c| c.into_owned()),
            message: db.message().to_string(),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DriverError::Connection(e.to_string()),
        other => DriverError::Operation {
            code: None,
            message: other.to_string(),
        },
    }
}
