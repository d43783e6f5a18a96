//! Shared test fixtures: a fake database server behind the [`Connector`] seam.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extdb_controller::driver::sql::{
    DUPLICATE_DATABASE, DUPLICATE_OBJECT, INVALID_CATALOG_NAME, UNDEFINED_OBJECT,
};
use extdb_controller::driver::{Connector, DriverError, Session};

#[derive(Default)]
struct Catalog {
    roles: BTreeSet<String>,
    databases: BTreeSet<String>,
    statements: Vec<String>,
    acquired: usize,
    released: usize,
    abandoned: usize,
    down: bool,
    hanging: bool,
}

/// In-process stand-in for a PostgreSQL server. Understands exactly the four
/// statements the driver issues and answers with real SQLSTATE codes.
#[derive(Clone, Default)]
pub struct FakeCluster {
    catalog: Arc<Mutex<Catalog>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(&self) -> Vec<String> {
        self.catalog.lock().unwrap().roles.iter().cloned().collect()
    }

    pub fn databases(&self) -> Vec<String> {
        self.catalog.lock().unwrap().databases.iter().cloned().collect()
    }

    pub fn statements(&self) -> Vec<String> {
        self.catalog.lock().unwrap().statements.clone()
    }

    pub fn add_role(&self, name: &str) {
        self.catalog.lock().unwrap().roles.insert(name.to_string());
    }

    pub fn set_down(&self, down: bool) {
        self.catalog.lock().unwrap().down = down;
    }

    /// Make every statement block until the calling future is dropped.
    pub fn set_hanging(&self, hanging: bool) {
        self.catalog.lock().unwrap().hanging = hanging;
    }

    pub fn acquired(&self) -> usize {
        self.catalog.lock().unwrap().acquired
    }

    pub fn released(&self) -> usize {
        self.catalog.lock().unwrap().released
    }

    pub fn abandoned(&self) -> usize {
        self.catalog.lock().unwrap().abandoned
    }
}

pub struct FakeSession {
    catalog: Arc<Mutex<Catalog>>,
}

#[async_trait]
impl Connector for FakeCluster {
    type Session = FakeSession;

    async fn acquire(&self) -> Result<FakeSession, DriverError> {
        let mut catalog = self.catalog.lock().unwrap();
        if catalog.down {
            return Err(DriverError::Connection(
                "connection refused (os error 111)".to_string(),
            ));
        }
        catalog.acquired += 1;
        Ok(FakeSession {
            catalog: Arc::clone(&self.catalog),
        })
    }
}

fn sqlstate(code: &str, message: String) -> Result<(), DriverError> {
    Err(DriverError::Operation {
        code: Some(code.to_string()),
        message,
    })
}

/// Undo identifier quoting: `"a""b"` -> `a"b`.
fn unquote(ident: &str) -> String {
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .expect("identifier must be quoted")
        .replace("\"\"", "\"")
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(&mut self, statement: &str) -> Result<(), DriverError> {
        let hanging = self.catalog.lock().unwrap().hanging;
        if hanging {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut catalog = self.catalog.lock().unwrap();
        catalog.statements.push(statement.to_string());

        if let Some(ident) = statement.strip_prefix("CREATE ROLE ") {
            let name = unquote(ident);
            if !catalog.roles.insert(name.clone()) {
                return sqlstate(DUPLICATE_OBJECT, format!("role \"{name}\" already exists"));
            }
        } else if let Some(ident) = statement.strip_prefix("DROP ROLE ") {
            let name = unquote(ident);
            if !catalog.roles.remove(&name) {
                return sqlstate(UNDEFINED_OBJECT, format!("role \"{name}\" does not exist"));
            }
        } else if let Some(ident) = statement.strip_prefix("CREATE DATABASE ") {
            let name = unquote(ident);
            if !catalog.databases.insert(name.clone()) {
                return sqlstate(
                    DUPLICATE_DATABASE,
                    format!("database \"{name}\" already exists"),
                );
            }
        } else if let Some(ident) = statement.strip_prefix("DROP DATABASE ") {
            let name = unquote(ident);
            if !catalog.databases.remove(&name) {
                return sqlstate(
                    INVALID_CATALOG_NAME,
                    format!("database \"{name}\" does not exist"),
                );
            }
        } else {
            return sqlstate("42601", format!("syntax error in {statement:?}"));
        }
        Ok(())
    }

    async fn release(self) {
        self.catalog.lock().unwrap().released += 1;
    }

    fn abandon(self) {
        self.catalog.lock().unwrap().abandoned += 1;
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub async fn eventually<F, Fut>(what: &str, condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}
