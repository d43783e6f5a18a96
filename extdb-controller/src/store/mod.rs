//! Desired-state store abstraction.
//!
//! The reconcile loop only needs point reads, optimistic writes and a stream
//! of changed keys. [`memory::InMemoryStore`] implements all three.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::resource::{ObjectKey, Resource};

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;

/// Point reads and optimistic writes of desired-state objects.
#[async_trait]
pub trait ObjectStore<R: Resource>: Send + Sync {
    /// Fetch the current snapshot of an object. `Ok(None)` if it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<R>>;

    /// Write an object back. Fails with [`StoreError::VersionConflict`] when
    /// `object` was read at an older resource version.
    async fn update(&self, object: R) -> Result<R>;
}

/// Source of reconcile requests.
pub trait Notifier: Send + Sync {
    /// Start a new watch. The stream first yields every key currently known,
    /// then every key touched afterwards. Keys may repeat. The stream may end,
    /// in which case the caller starts a new one.
    fn watch(&self) -> BoxStream<'static, ObjectKey>;
}
