//! Database reconciler - keeps a PostgreSQL database per Database object.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::Reconciler;
use crate::driver::{DriverError, ResourceDriver};
use crate::resource::Database;

pub const DATABASE_FINALIZER: &str = "postgresql.extdb.io/database";

/// Database reconciler that interacts with the database server.
pub struct DatabaseReconciler<D: ?Sized> {
    driver: Arc<D>,
}

impl<D: ResourceDriver + ?Sized> DatabaseReconciler<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl<D: ResourceDriver + ?Sized> Reconciler for DatabaseReconciler<D> {
    type Object = Database;

    fn finalizer(&self) -> &'static str {
        DATABASE_FINALIZER
    }

    async fn reconcile(&self, db: &Database) -> Result<(), DriverError> {
        info!("Reconciling database {} ({})", db.spec.name, db.metadata.key());
        self.driver.ensure_database_exists(&db.spec.name).await
    }

    async fn finalize(&self, db: &Database) -> Result<(), DriverError> {
        info!(
            "Finalizing (dropping) database {} ({})",
            db.spec.name,
            db.metadata.key()
        );
        self.driver.ensure_database_absent(&db.spec.name).await
    }
}
