//! SQLite backend for LifeOS: a [`DocumentStore`] with push-based change
//! notification, plus an email/password [`IdentityProvider`].
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.
//!
//! [`DocumentStore`]: lifeos_core::store::DocumentStore
//! [`IdentityProvider`]: lifeos_core::session::IdentityProvider

mod encode;
mod identity;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
