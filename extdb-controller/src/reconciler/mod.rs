//! Reconcilers for the managed kinds.
//!
//! [`reconcile_key`] is the per-request state machine shared by every kind.
//! It re-reads the object on every delivery and picks one branch:
//! - object gone: nothing to do
//! - deletion marker set: clean up the external resource, drop our finalizer
//! - otherwise: ensure the external resource exists, add our finalizer
//!
//! Kind-specific work lives behind the [`Reconciler`] trait.

pub mod database;
pub mod database_user;

use async_trait::async_trait;
use tracing::info;

use crate::error::{DriverError, Result};
use crate::finalizer;
use crate::resource::{ObjectKey, Resource};
use crate::store::ObjectStore;

pub use database::{DATABASE_FINALIZER, DatabaseReconciler};
pub use database_user::{DATABASE_USER_FINALIZER, DatabaseUserReconciler};

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The desired-state kind this reconciler manages.
    type Object: Resource;

    /// Finalizer token guarding the external resource.
    fn finalizer(&self) -> &'static str;

    /// Make sure the external resource exists.
    async fn reconcile(&self, object: &Self::Object) -> std::result::Result<(), DriverError>;

    /// Make sure the external resource is gone (finalization).
    async fn finalize(&self, object: &Self::Object) -> std::result::Result<(), DriverError>;
}

/// What a successful delivery did. None of these ask for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The object no longer exists in the store.
    NotFound,
    /// The external resource exists; `finalizer_added` is true when this
    /// delivery attached the finalizer.
    Ensured { finalizer_added: bool },
    /// The external resource is gone and our finalizer is released.
    CleanedUp,
}

/// Run one delivery for `key`. Errors mean "redeliver later"; the function
/// itself never retries.
pub async fn reconcile_key<R, S>(reconciler: &R, store: &S, key: &ObjectKey) -> Result<Outcome>
where
    R: Reconciler,
    S: ObjectStore<R::Object> + ?Sized,
{
    let Some(object) = store.get(key).await? else {
        info!(
            "{} {} not found, ignoring since it must have been deleted",
            R::Object::KIND,
            key
        );
        return Ok(Outcome::NotFound);
    };

    let token = reconciler.finalizer();

    // Deletion marker wins over anything else in the snapshot.
    if object.meta().is_deleting() {
        info!("Cleaning up {} {}", R::Object::KIND, key);
        reconciler.finalize(&object).await?;

        if finalizer::has(&object, token) {
            store.update(finalizer::remove(object, token)).await?;
            info!("Removed finalizer from {} {}", R::Object::KIND, key);
        }
        return Ok(Outcome::CleanedUp);
    }

    reconciler.reconcile(&object).await?;

    if finalizer::has(&object, token) {
        return Ok(Outcome::Ensured {
            finalizer_added: false,
        });
    }

    store.update(finalizer::add(object, token)).await?;
    info!("Added finalizer to {} {}", R::Object::KIND, key);
    Ok(Outcome::Ensured {
        finalizer_added: true,
    })
}
