//! SQLite backend for the acre farm store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Also provides a [`Provisioner`]
//! implementation that gives each tenant wiki its own SQLite file.
//!
//! [`Provisioner`]: acre_core::store::Provisioner

mod encode;
mod provision;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use provision::{ProvisionError, SqliteProvisioner};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
