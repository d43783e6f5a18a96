//! extdb-controller: keeps PostgreSQL roles and databases in line with
//! desired-state objects.
//!
//! - [`store`]: where desired-state objects live and how changes are announced
//! - [`reconciler`]: the per-request state machine and the per-kind reconcilers
//! - [`driver`]: idempotent create/drop against the database server
//! - [`controller`]: work queue, watcher and worker pool around the reconcilers

pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod finalizer;
pub mod manifest;
pub mod reconciler;
pub mod resource;
pub mod store;

#[cfg(test)]
mod test_support;
