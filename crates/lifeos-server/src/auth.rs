//! Bearer-token sessions: the `/auth` handlers, the token registry and the
//! middleware that puts the caller's [`Identity`] on every `/api` request.

use std::{
  collections::HashMap,
  sync::{Mutex, MutexGuard},
  time::{Duration, Instant},
};

use axum::{
  Json,
  extract::{FromRequestParts, Request, State},
  http::{HeaderMap, StatusCode, header, request::Parts},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use lifeos_core::{
  migrate::migrate_owner,
  session::{AuthError, Credentials, Identity, IdentityProvider},
  store::DocumentStore,
};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::{info, warn};

use crate::{AppState, error::Error};

/// Random bytes per issued token.
const TOKEN_BYTES: usize = 32;

// ─── Token registry ──────────────────────────────────────────────────────────

struct LiveSession {
  identity:  Identity,
  issued_at: Instant,
}

/// Live sessions, keyed by the SHA-256 digest of their token. The token
/// itself is only ever held by the client.
pub struct TokenRegistry {
  ttl:      Duration,
  sessions: Mutex<HashMap<String, LiveSession>>,
}

fn digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

impl TokenRegistry {
  /// Tokens issued by this registry stop resolving `ttl` after issue.
  pub fn new(ttl: Duration) -> Self {
    Self { ttl, sessions: Mutex::new(HashMap::new()) }
  }

  fn is_live(&self, session: &LiveSession, now: Instant) -> bool {
    now.saturating_duration_since(session.issued_at) < self.ttl
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, LiveSession>> {
    self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Start a session for `identity` and return its bearer token. Expired
  /// sessions are dropped on the way.
  pub fn issue(&self, identity: Identity) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = B64.encode(bytes);

    let now = Instant::now();
    let mut sessions = self.lock();
    sessions.retain(|_, session| self.is_live(session, now));
    sessions.insert(digest(&token), LiveSession { identity, issued_at: now });
    token
  }

  /// The identity behind `token`, if its session is still live. An expired
  /// session is evicted.
  pub fn resolve(&self, token: &str) -> Option<Identity> {
    let key = digest(token);
    let mut sessions = self.lock();
    let session = sessions.get(&key)?;
    if self.is_live(session, Instant::now()) {
      return Some(session.identity.clone());
    }
    sessions.remove(&key);
    None
  }

  /// End the session for `token`, returning whose it was.
  pub fn revoke(&self, token: &str) -> Option<Identity> {
    self.lock().remove(&digest(token)).map(|session| session.identity)
  }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// A request carrying a live bearer token.
pub struct Authenticated {
  pub identity: Identity,
  pub token:    String,
}

fn bearer(headers: &HeaderMap) -> Result<&str, Error> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(Error::Unauthorized)
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: DocumentStore + IdentityProvider + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer(&parts.headers)?;
    let identity = state.tokens.resolve(token).ok_or(Error::Unauthorized)?;
    Ok(Authenticated { identity, token: token.to_owned() })
  }
}

/// Reject unauthenticated requests; hand the caller's identity to the
/// handlers behind it as a request extension.
pub async fn require_identity(auth: Authenticated, mut req: Request, next: Next) -> Response {
  req.extensions_mut().insert(auth.identity);
  next.run(req).await
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpBody {
  pub email:        String,
  pub password:     String,
  pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LogInBody {
  pub email:    String,
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionBody {
  pub token: String,
  pub user:  Identity,
}

/// Open a session for `identity` and bring its stored records up to date.
async fn open_session<S>(state: &AppState<S>, identity: Identity) -> SessionBody
where
  S: DocumentStore + IdentityProvider + 'static,
{
  let adopt = state.config.adopt_legacy_records;
  // A failed migration leaves the documents as they were; reads still
  // repair them in memory.
  if let Err(e) = migrate_owner(&state.db, &identity.user_id, adopt).await {
    warn!(user = %identity.user_id, error = %e, "migration failed");
  }
  let token = state.tokens.issue(identity.clone());
  SessionBody { token, user: identity }
}

/// `POST /auth/signup`
pub async fn sign_up<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<SignUpBody>,
) -> Result<impl IntoResponse, Error>
where
  S: DocumentStore + IdentityProvider + 'static,
{
  let display_name = body.display_name.trim();
  if display_name.is_empty() {
    return Err(AuthError::MissingDisplayName.into());
  }
  let credentials = Credentials::new(body.email, body.password);
  credentials.validate()?;

  let identity = state.db.store().sign_up(&credentials, display_name).await?;
  info!(user = %identity.user_id, "account created");
  Ok((StatusCode::CREATED, Json(open_session(&state, identity).await)))
}

/// `POST /auth/login`
pub async fn log_in<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<LogInBody>,
) -> Result<Json<SessionBody>, Error>
where
  S: DocumentStore + IdentityProvider + 'static,
{
  let credentials = Credentials::new(body.email, body.password);
  credentials.validate()?;

  let identity = state.db.store().log_in(&credentials).await?;
  info!(user = %identity.user_id, "signed in");
  Ok(Json(open_session(&state, identity).await))
}

/// `POST /auth/logout`
pub async fn log_out<S>(
  State(state): State<AppState<S>>,
  auth: Authenticated,
) -> Result<StatusCode, Error>
where
  S: DocumentStore + IdentityProvider + 'static,
{
  state.tokens.revoke(&auth.token);
  state.db.store().log_out(&auth.identity).await?;
  info!(user = %auth.identity.user_id, "signed out");
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /auth/me`
pub async fn me(auth: Authenticated) -> Json<Identity> { Json(auth.identity) }

#[cfg(test)]
mod tests {
  use super::*;

  fn ada() -> Identity {
    Identity {
      user_id:      "u1".into(),
      email:        "ada@example.com".into(),
      display_name: "Ada".into(),
    }
  }

  const HOUR: Duration = Duration::from_secs(3600);

  #[test]
  fn issued_token_resolves_until_revoked() {
    let tokens = TokenRegistry::new(HOUR);
    let token = tokens.issue(ada());
    assert_eq!(tokens.resolve(&token), Some(ada()));
    assert_eq!(tokens.revoke(&token), Some(ada()));
    assert_eq!(tokens.resolve(&token), None);
    assert_eq!(tokens.revoke(&token), None);
  }

  #[test]
  fn tokens_are_unique_and_only_digests_are_kept() {
    let tokens = TokenRegistry::new(HOUR);
    let a = tokens.issue(ada());
    let b = tokens.issue(ada());
    assert_ne!(a, b);
    assert_eq!(B64.decode(&a).unwrap().len(), TOKEN_BYTES);

    let sessions = tokens.lock();
    assert!(!sessions.contains_key(&a));
    assert!(sessions.contains_key(&digest(&a)));
    assert_eq!(digest(&a).len(), 64);
  }

  #[test]
  fn expired_tokens_are_evicted() {
    let tokens = TokenRegistry::new(Duration::ZERO);
    let stale = tokens.issue(ada());
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.resolve(&stale), None);
    assert!(tokens.is_empty());

    tokens.issue(ada());
    tokens.issue(ada());
    // Each issue prunes what expired before it.
    assert_eq!(tokens.len(), 1);
  }

  #[test]
  fn bearer_header_parsing() {
    let mut headers = HeaderMap::new();
    assert!(matches!(bearer(&headers), Err(Error::Unauthorized)));
    headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
    assert!(matches!(bearer(&headers), Err(Error::Unauthorized)));
    headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
    assert_eq!(bearer(&headers).unwrap(), "abc");
  }
}
