//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn record_not_found(collection: &str, id: Uuid) -> Self {
    Self::NotFound(format!("{collection} record not found: {id}"))
  }
}

impl From<lifeos_core::Error> for ApiError {
  fn from(e: lifeos_core::Error) -> Self {
    use lifeos_core::Error as E;
    match e {
      // A record without an owner is nobody's, so the caller cannot see it.
      E::RecordNotFound { .. } | E::MissingOwner { .. } | E::ChecklistItemNotFound(_) => {
        Self::NotFound(e.to_string())
      }
      E::Invalid(message) => Self::BadRequest(message),
      E::Store(inner) => Self::Store(inner),
      other => Self::Store(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store error");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
