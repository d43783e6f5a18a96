//! Finalizer helpers.
//!
//! Pure functions over an object's finalizer list. Callers persist the
//! returned object themselves.

use crate::resource::Resource;

/// Whether `token` is present on the object.
pub fn has<R: Resource>(object: &R, token: &str) -> bool {
    object.meta().finalizers.iter().any(|f| f == token)
}

/// Adds `token`; no-op if already present.
pub fn add<R: Resource>(mut object: R, token: &str) -> R {
    if !has(&object, token) {
        object.meta_mut().finalizers.push(token.to_string());
    }
    object
}

/// Removes `token`; no-op if absent.
pub fn remove<R: Resource>(mut object: R, token: &str) -> R {
    object.meta_mut().finalizers.retain(|f| f != token);
    object
}
