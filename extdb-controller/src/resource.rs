//! Desired-state objects reconciled by the controller.
//!
//! Every object carries [`ObjectMeta`] (identity, optimistic-concurrency
//! version, deletion marker and finalizers) plus a kind-specific spec naming
//! the external resource it describes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identity of an object within a store, and the unit of work delivered to
/// the reconcile loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Metadata shared by all desired-state objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Optimistic-concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Deletion marker. Set by the store when deletion is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// An object pending deletion with no finalizers left may be erased.
    pub fn is_erasable(&self) -> bool {
        self.is_deleting() && self.finalizers.is_empty()
    }
}

/// A kind of desired-state object.
pub trait Resource:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kind name used in logs.
    const KIND: &'static str;

    type Spec: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn spec(&self) -> &Self::Spec;

    fn spec_mut(&mut self) -> &mut Self::Spec;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// Desired PostgreSQL role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserSpec {
    /// Role name in the database server.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseUser {
    pub metadata: ObjectMeta,
    pub spec: DatabaseUserSpec,
}

impl DatabaseUser {
    pub fn new(namespace: &str, name: &str, role: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: DatabaseUserSpec {
                name: role.to_string(),
            },
        }
    }
}

impl Resource for DatabaseUser {
    const KIND: &'static str = "DatabaseUser";

    type Spec = DatabaseUserSpec;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self { metadata, spec }
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut Self::Spec {
        &mut self.spec
    }
}

/// Desired PostgreSQL database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database name in the database server.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub metadata: ObjectMeta,
    pub spec: DatabaseSpec,
}

impl Database {
    pub fn new(namespace: &str, name: &str, database: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: DatabaseSpec {
                name: database.to_string(),
            },
        }
    }
}

impl Resource for Database {
    const KIND: &'static str = "Database";

    type Spec = DatabaseSpec;

    fn from_parts(metadata: ObjectMeta, spec: Self::Spec) -> Self {
        Self { metadata, spec }
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut Self::Spec {
        &mut self.spec
    }
}
