//! DatabaseUser reconciler - keeps a PostgreSQL role per DatabaseUser object.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::Reconciler;
use crate::driver::{DriverError, ResourceDriver};
use crate::resource::DatabaseUser;

pub const DATABASE_USER_FINALIZER: &str = "postgresql.extdb.io/database-user";

/// Role reconciler that interacts with the database server.
pub struct DatabaseUserReconciler<D: ?Sized> {
    driver: Arc<D>,
}

impl<D: ResourceDriver + ?Sized> DatabaseUserReconciler<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl<D: ResourceDriver + ?Sized> Reconciler for DatabaseUserReconciler<D> {
    type Object = DatabaseUser;

    fn finalizer(&self) -> &'static str {
        DATABASE_USER_FINALIZER
    }

    async fn reconcile(&self, user: &DatabaseUser) -> Result<(), DriverError> {
        info!(
            "Reconciling role {} ({})",
            user.spec.name,
            user.metadata.key()
        );
        self.driver.ensure_role_exists(&user.spec.name).await
    }

    async fn finalize(&self, user: &DatabaseUser) -> Result<(), DriverError> {
        info!(
            "Finalizing (dropping) role {} ({})",
            user.spec.name,
            user.metadata.key()
        );
        self.driver.ensure_role_absent(&user.spec.name).await
    }
}
