//! Command-line and environment configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use sqlx::postgres::PgConnectOptions;

use crate::controller::{Backoff, ControllerConfig};

/// Connection parameters for the managed database server.
#[derive(Args, Clone)]
pub struct DatabaseConfig {
    /// Database server host
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    /// Database server port
    #[arg(long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Role used to manage roles and databases
    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,

    /// Password for the management role
    #[arg(long = "db-password", env = "DB_PASS", hide_env_values = true)]
    pub password: Option<String>,

    /// Database to connect to
    #[arg(long = "db-name", env = "DB_NAME", default_value = "postgres")]
    pub dbname: String,
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.dbname);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// Reconcile loop tuning.
#[derive(Args, Debug, Clone)]
pub struct RuntimeConfig {
    /// Concurrent reconciliations per kind
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// First retry delay in milliseconds (doubles per consecutive failure)
    #[arg(long, default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Retry delay ceiling in seconds
    #[arg(long, default_value_t = 300)]
    pub retry_max_secs: u64,

    /// Full resync interval in seconds
    #[arg(long, default_value_t = 600)]
    pub resync_secs: u64,

    /// Pooled connections to the database server (0 = one connection per operation)
    #[arg(long, default_value_t = 0)]
    pub pool_size: u32,
}

impl RuntimeConfig {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers.max(1),
            backoff: Backoff {
                base: Duration::from_millis(self.retry_base_ms),
                max: Duration::from_secs(self.retry_max_secs),
            },
            resync_interval: Duration::from_secs(self.resync_secs.max(1)),
        }
    }
}

/// Desired-state source for standalone mode.
#[derive(Args, Debug, Clone)]
pub struct ManifestConfig {
    /// JSON manifest listing DatabaseUser and Database objects
    #[arg(long)]
    pub manifest: PathBuf,

    /// How often to re-read the manifest, in seconds
    #[arg(long, default_value_t = 10)]
    pub manifest_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[derive(Parser, Debug)]
    struct TestArgs {
        #[command(flatten)]
        db: DatabaseConfig,
        #[command(flatten)]
        runtime: RuntimeConfig,
    }

    #[test]
    fn test_flags_build_connect_options() {
        let args = TestArgs::try_parse_from([
            "test",
            "--db-host",
            "db.internal",
            "--db-port",
            "6543",
            "--db-user",
            "operator",
            "--db-password",
            "hunter2",
            "--db-name",
            "admin",
        ])
        .unwrap();

        let options = args.db.connect_options();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "operator");
        assert_eq!(options.get_database(), Some("admin"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let args = TestArgs::try_parse_from(["test", "--db-password", "hunter2"]).unwrap();
        let debug = format!("{:?}", args.db);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_connection_env_names() {
        let command = TestArgs::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|a| a.get_id() == id)
                .and_then(|a| a.get_env())
                .map(|e| e.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("host").as_deref(), Some("DB_HOST"));
        assert_eq!(env_of("port").as_deref(), Some("DB_PORT"));
        assert_eq!(env_of("user").as_deref(), Some("DB_USER"));
        assert_eq!(env_of("password").as_deref(), Some("DB_PASS"));
        assert_eq!(env_of("dbname").as_deref(), Some("DB_NAME"));
    }

    #[test]
    fn test_runtime_defaults() {
        let args = TestArgs::try_parse_from(["test"]).unwrap();
        let config = args.runtime.controller_config();
        assert_eq!(config.workers, 4);
        assert_eq!(config.backoff.base, Duration::from_millis(500));
        assert_eq!(config.backoff.max, Duration::from_secs(300));
        assert_eq!(config.resync_interval, Duration::from_secs(600));
        assert_eq!(args.runtime.pool_size, 0);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let args = TestArgs::try_parse_from(["test", "--workers", "0"]).unwrap();
        assert_eq!(args.runtime.controller_config().workers, 1);
    }
}
