//! Error type for `lifeos-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored body that is not a JSON object.
  #[error("document {collection}/{id} is not a JSON object")]
  CorruptDocument { collection: String, id: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
