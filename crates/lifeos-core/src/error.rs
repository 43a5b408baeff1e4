//! Error types for `lifeos-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{collection} record not found: {id}")]
  RecordNotFound { collection: &'static str, id: Uuid },

  #[error("{collection} record {id} has no owner")]
  MissingOwner { collection: &'static str, id: Uuid },

  #[error("checklist item not found: {0}")]
  ChecklistItemNotFound(Uuid),

  #[error("invalid record: {0}")]
  Invalid(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backing-store error.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
