//! HTTP server for LifeOS.
//!
//! Combines the `/auth` session endpoints with the [`lifeos_api`] router
//! under `/api`, which only admits requests carrying a live bearer token.

pub mod auth;
pub mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router, middleware,
  routing::{get, post},
};
use lifeos_core::{Db, session::IdentityProvider, store::DocumentStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::TokenRegistry;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `LIFEOS_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  /// Give records written before accounts existed to whoever signs in.
  pub adopt_legacy_records: bool,
  /// How long a bearer token stays valid after sign-in.
  pub session_ttl_secs:     u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_owned(),
      port:                 8080,
      store_path:           PathBuf::from("lifeos.db"),
      adopt_legacy_records: false,
      session_ttl_secs:     7 * 24 * 60 * 60,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the `/auth` handlers.
pub struct AppState<S> {
  pub db:     Db<S>,
  pub tokens: Arc<TokenRegistry>,
  pub config: Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      db:     self.db.clone(),
      tokens: self.tokens.clone(),
      config: self.config.clone(),
    }
  }
}

impl<S: DocumentStore + 'static> AppState<S> {
  pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
    Self {
      db:     Db::new(store),
      tokens: Arc::new(TokenRegistry::new(Duration::from_secs(
        config.session_ttl_secs,
      ))),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the whole server.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: DocumentStore + IdentityProvider + 'static,
{
  let api = lifeos_api::api_router(state.db.clone()).layer(
    middleware::from_fn_with_state(state.clone(), auth::require_identity),
  );

  Router::new()
    .route("/auth/signup", post(auth::sign_up::<S>))
    .route("/auth/login", post(auth::log_in::<S>))
    .route("/auth/logout", post(auth::log_out::<S>))
    .route("/auth/me", get(auth::me))
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use lifeos_core::store::Fields;
  use lifeos_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state(adopt: bool) -> AppState<SqliteStore> {
    state_with(ServerConfig {
      adopt_legacy_records: adopt,
      ..ServerConfig::default()
    })
    .await
  }

  async fn state_with(config: ServerConfig) -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(Arc::new(store), ServerConfig {
      store_path: PathBuf::from(":memory:"),
      ..config
    })
  }

  async fn oneshot_json(
    state: &AppState<SqliteStore>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
      Some(body) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    router(state.clone()).oneshot(req).await.unwrap()
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  async fn sign_up(state: &AppState<SqliteStore>, email: &str) -> (String, Value) {
    let resp = oneshot_json(
      state,
      "POST",
      "/auth/signup",
      None,
      Some(json!({ "email": email, "password": "hunter22", "displayName": "Ada" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    (body["token"].as_str().unwrap().to_owned(), body["user"].clone())
  }

  // ── Auth ─────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn sign_up_issues_a_working_token() {
    let state = make_state(false).await;
    let (token, user) = sign_up(&state, "ada@example.com").await;
    assert_eq!(user["displayName"], "Ada");

    let me = oneshot_json(&state, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(json_body(me).await, user);
  }

  #[tokio::test]
  async fn api_requires_a_bearer_token() {
    let state = make_state(false).await;
    let resp = oneshot_json(&state, "GET", "/api/tasks", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let resp = oneshot_json(&state, "GET", "/api/tasks", Some("made-up"), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn logout_revokes_the_token() {
    let state = make_state(false).await;
    let (token, _) = sign_up(&state, "ada@example.com").await;

    let resp = oneshot_json(&state, "POST", "/auth/logout", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = oneshot_json(&state, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn expired_token_is_rejected() {
    let state = state_with(ServerConfig {
      session_ttl_secs: 0,
      ..ServerConfig::default()
    })
    .await;
    let (token, _) = sign_up(&state, "ada@example.com").await;

    let resp = oneshot_json(&state, "GET", "/api/tasks", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = oneshot_json(&state, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(state.tokens.is_empty());
  }

  #[tokio::test]
  async fn login_errors_are_user_facing() {
    let state = make_state(false).await;
    sign_up(&state, "ada@example.com").await;

    let wrong = oneshot_json(
      &state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "email": "ada@example.com", "password": "hunter23" })),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong).await["error"], "Invalid email or password");

    let duplicate = oneshot_json(
      &state,
      "POST",
      "/auth/signup",
      None,
      Some(json!({ "email": "ada@example.com", "password": "hunter22", "displayName": "Ada" })),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let weak = oneshot_json(
      &state,
      "POST",
      "/auth/signup",
      None,
      Some(json!({ "email": "bob@example.com", "password": "123", "displayName": "Bob" })),
    )
    .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
      json_body(weak).await["error"],
      "Password must be at least 6 characters"
    );
  }

  // ── Records ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn records_are_scoped_to_the_token_holder() {
    let state = make_state(false).await;
    let (u1, _) = sign_up(&state, "u1@example.com").await;
    let (u2, _) = sign_up(&state, "u2@example.com").await;

    let created = oneshot_json(
      &state,
      "POST",
      "/api/tasks",
      Some(&u1),
      Some(json!({ "title": "Write spec" })),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = json_body(created).await["id"].as_str().unwrap().to_owned();

    let theirs = json_body(oneshot_json(&state, "GET", "/api/tasks", Some(&u2), None).await).await;
    assert!(theirs.as_array().unwrap().is_empty());
    let resp = oneshot_json(&state, "GET", &format!("/api/tasks/{id}"), Some(&u2), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mine = json_body(oneshot_json(&state, "GET", "/api/tasks", Some(&u1), None).await).await;
    assert_eq!(mine[0]["title"], "Write spec");
  }

  #[tokio::test]
  async fn login_adopts_legacy_records_when_enabled() {
    let state = make_state(true).await;
    let (_, user) = sign_up(&state, "ada@example.com").await;
    let mut legacy = Fields::new();
    legacy.insert("title".into(), json!("From before accounts"));
    state.db.store().insert("tasks", legacy).await.unwrap();

    let resp = oneshot_json(
      &state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "email": "ADA@example.com", "password": "hunter22" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let session = json_body(resp).await;
    assert_eq!(session["user"], user);
    let token = session["token"].as_str().unwrap();

    let tasks = json_body(oneshot_json(&state, "GET", "/api/tasks", Some(token), None).await).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["title"], "From before accounts");
    assert_eq!(tasks[0]["userId"], user["userId"]);
  }
}
