//! Who is signed in.
//!
//! An [`IdentityProvider`] checks credentials; a [`Session`] wraps one and
//! tracks the sign-in state machine, publishing every transition on a watch
//! channel so feeds (see
//! [`Collection::follow`](crate::collection::Collection::follow)) can re-scope
//! themselves.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::record::UserId;

pub const MIN_PASSWORD_LEN: usize = 6;

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
  pub email:    String,
  pub password: String,
}

impl Credentials {
  pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
    Self { email: email.into().trim().to_owned(), password: password.into() }
  }

  /// The checks a sign-in form makes before contacting the provider.
  pub fn validate(&self) -> Result<(), AuthError> {
    let looks_like_email = self
      .email
      .split_once('@')
      .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !looks_like_email {
      return Err(AuthError::InvalidEmail);
    }
    if self.password.chars().count() < MIN_PASSWORD_LEN {
      return Err(AuthError::WeakPassword);
    }
    Ok(())
  }
}

/// A signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  pub user_id:      UserId,
  pub email:        String,
  pub display_name: String,
}

/// Failures shown to the user as-is. None of them is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
  #[error("Invalid email or password")]
  InvalidCredentials,

  #[error("An account with this email already exists")]
  EmailInUse,

  #[error("Password must be at least 6 characters")]
  WeakPassword,

  #[error("Please enter a valid email address")]
  InvalidEmail,

  #[error("Please enter your name")]
  MissingDisplayName,

  #[error("Someone is already signed in, or a sign-in is in progress")]
  SessionBusy,

  #[error("Authentication failed: {0}")]
  Provider(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
  #[default]
  Anonymous,
  Authenticating,
  Authenticated(Identity),
}

impl SessionState {
  pub fn identity(&self) -> Option<&Identity> {
    match self {
      Self::Authenticated(identity) => Some(identity),
      _ => None,
    }
  }

  pub fn user_id(&self) -> Option<&UserId> { self.identity().map(|i| &i.user_id) }
}

// ─── Provider trait ──────────────────────────────────────────────────────────

/// Email/password account backend.
pub trait IdentityProvider: Send + Sync {
  /// Create an account and return its new identity.
  fn sign_up<'a>(
    &'a self,
    credentials: &'a Credentials,
    display_name: &'a str,
  ) -> impl Future<Output = Result<Identity, AuthError>> + Send + 'a;

  fn log_in<'a>(
    &'a self,
    credentials: &'a Credentials,
  ) -> impl Future<Output = Result<Identity, AuthError>> + Send + 'a;

  fn log_out<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<(), AuthError>> + Send + 'a;
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Sign-in state for one consumer.
pub struct Session<P> {
  provider: Arc<P>,
  state:    watch::Sender<SessionState>,
}

/// Puts the session back to anonymous if an attempt is abandoned midway.
struct Attempt<'a> {
  state: &'a watch::Sender<SessionState>,
  done:  bool,
}

impl Drop for Attempt<'_> {
  fn drop(&mut self) {
    if !self.done {
      self.state.send_if_modified(|s| {
        let pending = matches!(s, SessionState::Authenticating);
        if pending {
          *s = SessionState::Anonymous;
        }
        pending
      });
    }
  }
}

impl<P: IdentityProvider> Session<P> {
  pub fn new(provider: Arc<P>) -> Self {
    let (state, _) = watch::channel(SessionState::Anonymous);
    Self { provider, state }
  }

  pub fn state(&self) -> SessionState { self.state.borrow().clone() }

  pub fn current(&self) -> Option<Identity> {
    self.state.borrow().identity().cloned()
  }

  /// Observe every state transition.
  pub fn watch(&self) -> watch::Receiver<SessionState> { self.state.subscribe() }

  fn begin(&self) -> Result<Attempt<'_>, AuthError> {
    let started = self.state.send_if_modified(|s| {
      let idle = matches!(s, SessionState::Anonymous);
      if idle {
        *s = SessionState::Authenticating;
      }
      idle
    });
    if !started {
      return Err(AuthError::SessionBusy);
    }
    Ok(Attempt { state: &self.state, done: false })
  }

  fn finish(
    &self,
    mut attempt: Attempt<'_>,
    result: Result<Identity, AuthError>,
  ) -> Result<Identity, AuthError> {
    attempt.done = true;
    match &result {
      Ok(identity) => {
        info!(user = %identity.user_id, "signed in");
        self.state.send_replace(SessionState::Authenticated(identity.clone()));
      }
      Err(e) => {
        debug!(error = %e, "sign-in failed");
        self.state.send_replace(SessionState::Anonymous);
      }
    }
    result
  }

  pub async fn log_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
    credentials.validate()?;
    let attempt = self.begin()?;
    let result = self.provider.log_in(credentials).await;
    self.finish(attempt, result)
  }

  pub async fn sign_up(
    &self,
    credentials: &Credentials,
    display_name: &str,
  ) -> Result<Identity, AuthError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
      return Err(AuthError::MissingDisplayName);
    }
    credentials.validate()?;
    let attempt = self.begin()?;
    let result = self.provider.sign_up(credentials, display_name).await;
    self.finish(attempt, result)
  }

  /// Clear the session. The state is anonymous afterwards even if the
  /// provider reports an error.
  pub async fn log_out(&self) -> Result<(), AuthError> {
    let previous = self.state.send_replace(SessionState::Anonymous);
    match previous {
      SessionState::Authenticated(identity) => {
        info!(user = %identity.user_id, "signed out");
        self.provider.log_out(&identity).await
      }
      _ => Ok(()),
    }
  }
}
