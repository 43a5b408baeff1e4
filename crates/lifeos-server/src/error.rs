//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use lifeos_core::session::AuthError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error(transparent)]
  Auth(#[from] AuthError),
}

fn body(status: StatusCode, message: String) -> Response {
  (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = body(StatusCode::UNAUTHORIZED, "Unauthorized".to_owned());
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Bearer realm=\"lifeos\""),
        );
        res
      }
      Error::Auth(e) => {
        let status = match &e {
          AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
          AuthError::EmailInUse | AuthError::SessionBusy => StatusCode::CONFLICT,
          AuthError::WeakPassword
          | AuthError::InvalidEmail
          | AuthError::MissingDisplayName => StatusCode::BAD_REQUEST,
          AuthError::Provider(message) => {
            tracing::error!(error = %message, "identity provider failed");
            StatusCode::INTERNAL_SERVER_ERROR
          }
        };
        body(status, e.to_string())
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
