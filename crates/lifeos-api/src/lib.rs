//! JSON REST API for LifeOS.
//!
//! Exposes an axum [`Router`] over a [`Db`] backed by any
//! [`DocumentStore`]. Every handler acts on behalf of the [`Identity`] found
//! in the request extensions; authenticating the request and inserting that
//! identity is the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", lifeos_api::api_router(db.clone()))
//! ```
//!
//! [`Identity`]: lifeos_core::session::Identity

pub mod checklist;
pub mod error;
pub mod records;
pub mod views;

use axum::{Router, routing::get};
use lifeos_core::{
  Db,
  record::{
    ErasmusInternship, JobApplication, MasterApplication, ScholarshipProgram,
    Task, UsefulLink,
  },
  store::DocumentStore,
};

pub use error::ApiError;

/// Build the API router for `db`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(db: Db<S>) -> Router<()>
where
  S: DocumentStore + 'static,
{
  let router = Router::new();
  // Records
  let router = records::routes::<Task, S>(router);
  let router = records::routes::<JobApplication, S>(router);
  let router = records::routes::<MasterApplication, S>(router);
  let router = records::routes::<ErasmusInternship, S>(router);
  let router = records::routes::<UsefulLink, S>(router);
  let router = records::routes::<ScholarshipProgram, S>(router);
  // Checklists
  let router = checklist::routes::<MasterApplication, S>(router);
  let router = checklist::routes::<ScholarshipProgram, S>(router);

  router
    // Views
    .route("/tasks/view", get(views::tasks::<S>))
    .route("/agenda", get(views::agenda::<S>))
    .route("/countries", get(views::countries::<S>))
    .route("/countries/{country}", get(views::country::<S>))
    .route("/links/by-category", get(views::links::<S>))
    .with_state(db)
}
