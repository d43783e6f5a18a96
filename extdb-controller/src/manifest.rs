//! Standalone desired-state source.
//!
//! A JSON manifest lists the objects that should exist. Applying it to an
//! [`InMemoryStore`] creates new objects, updates changed specs and requests
//! deletion of objects no longer listed. The controller then converges the
//! database server on its own.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::resource::{DatabaseSpec, DatabaseUserSpec, ObjectKey, ObjectMeta, Resource};
use crate::store::{InMemoryStore, ObjectStore, StoreError};

fn default_namespace() -> String {
    "default".to_string()
}

/// One object in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry<S> {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub spec: S,
}

impl<S> Entry<S> {
    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub database_users: Vec<Entry<DatabaseUserSpec>>,
    #[serde(default)]
    pub databases: Vec<Entry<DatabaseSpec>>,
}

impl Manifest {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid manifest")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&json)
    }
}

/// Changes made by one [`sync`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Converge `store` to `entries`.
pub async fn sync<R: Resource>(
    store: &InMemoryStore<R>,
    entries: &[Entry<R::Spec>],
) -> Result<SyncSummary> {
    let mut summary = SyncSummary::default();
    let mut desired = BTreeSet::new();

    for entry in entries {
        let key = entry.key();
        if !desired.insert(key.clone()) {
            warn!("Duplicate {} {} in manifest, using first entry", R::KIND, key);
            continue;
        }

        match store.get(&key).await? {
            None => {
                let object = R::from_parts(
                    ObjectMeta::new(entry.namespace.clone(), entry.name.clone()),
                    entry.spec.clone(),
                );
                store.create(object).await?;
                summary.created += 1;
            }
            Some(existing) if existing.meta().is_deleting() => {
                debug!("{} {} is still being deleted, skipping", R::KIND, key);
            }
            Some(existing) if existing.spec() != &entry.spec => {
                let mut object = existing;
                *object.spec_mut() = entry.spec.clone();
                match store.update(object).await {
                    Ok(_) => summary.updated += 1,
                    Err(StoreError::VersionConflict { .. }) => {
                        debug!("{} {} changed concurrently, retrying next pass", R::KIND, key);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(_) => {}
        }
    }

    for object in store.list().await? {
        let key = object.key();
        if desired.contains(&key) || object.meta().is_deleting() {
            continue;
        }
        store.request_delete(&key).await?;
        summary.deleted += 1;
    }

    if summary != SyncSummary::default() {
        info!(
            "Synced {} manifest (created={}, updated={}, deleted={})",
            R::KIND,
            summary.created,
            summary.updated,
            summary.deleted
        );
    }
    Ok(summary)
}
