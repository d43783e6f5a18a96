//! In-memory desired-state store.
//!
//! Keeps objects in a map guarded by a synchronous lock (never held across an
//! await) and publishes the key of every write on a broadcast channel.
//! Objects pending deletion are erased as soon as their last finalizer is
//! removed.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{Result, StoreError};
use super::{Notifier, ObjectStore};
use crate::resource::{ObjectKey, Resource};

const EVENT_BUFFER: usize = 256;

pub struct InMemoryStore<R> {
    objects: RwLock<BTreeMap<ObjectKey, R>>,
    events: broadcast::Sender<ObjectKey>,
}

impl<R: Resource> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> InMemoryStore<R> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<ObjectKey, R>>> {
        self.objects
            .read()
            .map_err(|_| StoreError::Internal("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<ObjectKey, R>>> {
        self.objects
            .write()
            .map_err(|_| StoreError::Internal("store lock poisoned".to_string()))
    }

    fn notify(&self, key: ObjectKey) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(key);
    }

    /// Insert a new object. The store assigns uid, creation time and version 1;
    /// any deletion marker on the input is discarded.
    pub async fn create(&self, mut object: R) -> Result<R> {
        let key = object.key();
        {
            let mut objects = self.write()?;
            if objects.contains_key(&key) {
                return Err(StoreError::AlreadyExists(key.to_string()));
            }
            let meta = object.meta_mut();
            meta.uid = Some(Uuid::new_v4().to_string());
            meta.resource_version = 1;
            meta.creation_timestamp = Some(Utc::now());
            meta.deletion_timestamp = None;
            objects.insert(key.clone(), object.clone());
        }
        debug!("Created {} {}", R::KIND, key);
        self.notify(key);
        Ok(object)
    }

    /// All objects, ordered by key.
    pub async fn list(&self) -> Result<Vec<R>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Request deletion. Objects without finalizers are erased immediately,
    /// otherwise the deletion marker is set and erasure waits for the last
    /// finalizer to be removed.
    pub async fn request_delete(&self, key: &ObjectKey) -> Result<()> {
        {
            let mut objects = self.write()?;
            let object = objects
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

            if object.meta().finalizers.is_empty() {
                objects.remove(key);
                debug!("Erased {} {}", R::KIND, key);
            } else if !object.meta().is_deleting() {
                let meta = object.meta_mut();
                meta.deletion_timestamp = Some(Utc::now());
                meta.resource_version += 1;
                debug!(
                    "Marked {} {} for deletion (finalizers: {:?})",
                    R::KIND,
                    key,
                    meta.finalizers
                );
            } else {
                return Ok(());
            }
        }
        self.notify(key.clone());
        Ok(())
    }
}

#[async_trait]
impl<R: Resource> ObjectStore<R> for InMemoryStore<R> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<R>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn update(&self, mut object: R) -> Result<R> {
        let key = object.key();
        {
            let mut objects = self.write()?;
            let current = objects
                .get(&key)
                .map(|o| o.meta().clone())
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

            let expected = object.meta().resource_version;
            if expected != current.resource_version {
                return Err(StoreError::VersionConflict {
                    expected,
                    actual: current.resource_version,
                });
            }

            // Identity and the deletion marker are owned by the store.
            let meta = object.meta_mut();
            meta.uid = current.uid;
            meta.creation_timestamp = current.creation_timestamp;
            meta.deletion_timestamp = current.deletion_timestamp;
            meta.resource_version = current.resource_version + 1;

            if object.meta().is_erasable() {
                objects.remove(&key);
                debug!("Erased {} {} after last finalizer", R::KIND, key);
            } else {
                objects.insert(key.clone(), object.clone());
            }
        }
        self.notify(key);
        Ok(object)
    }
}

impl<R: Resource> Notifier for InMemoryStore<R> {
    fn watch(&self) -> BoxStream<'static, ObjectKey> {
        // Subscribe before listing so no write falls between the two.
        let live = BroadcastStream::new(self.events.subscribe());
        let initial: Vec<ObjectKey> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        let live = live.scan((), |_, event| {
            future::ready(match event {
                Ok(key) => Some(key),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!("Watch fell behind by {} events, ending stream", missed);
                    None
                }
            })
        });

        stream::iter(initial).chain(live).boxed()
    }
}
