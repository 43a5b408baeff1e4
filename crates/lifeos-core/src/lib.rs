//! Core types and trait definitions for the LifeOS personal dashboard.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! defines the record schemas, the [`store::DocumentStore`] contract that
//! backing stores implement, and the generic owner-scoped
//! [`collection::Collection`] every consumer talks to.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod collection;
pub mod error;
pub mod feed;
pub mod memory;
pub mod migrate;
pub mod record;
pub mod schema;
pub mod session;
pub mod store;
pub mod view;

pub use collection::{Collection, Db};
pub use error::{Error, Result};
pub use record::{Record, Stored, UserId};
