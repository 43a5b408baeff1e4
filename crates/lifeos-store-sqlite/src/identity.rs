//! Email/password accounts kept in the `users` table.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use chrono::Utc;
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use lifeos_core::session::{AuthError, Credentials, Identity, IdentityProvider};

use crate::{
  SqliteStore,
  encode::{RawUser, encode_dt, encode_uuid, normalise_email},
};

fn provider_error(e: impl std::fmt::Display) -> AuthError {
  AuthError::Provider(e.to_string())
}

fn hash_password(password: &str) -> Result<String, AuthError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(provider_error)
}

fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc).is_ok_and(|parsed| {
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
}

impl IdentityProvider for SqliteStore {
  async fn sign_up(
    &self,
    credentials: &Credentials,
    display_name: &str,
  ) -> Result<Identity, AuthError> {
    credentials.validate()?;
    let display_name = display_name.trim().to_owned();
    if display_name.is_empty() {
      return Err(AuthError::MissingDisplayName);
    }

    let identity = Identity {
      user_id:      encode_uuid(Uuid::new_v4()).into(),
      email:        normalise_email(&credentials.email),
      display_name,
    };
    let password_hash = hash_password(&credentials.password)?;

    let row = identity.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO users (user_id, email, display_name, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            row.user_id.to_string(),
            row.email,
            row.display_name,
            password_hash,
            encode_dt(Utc::now()),
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            Ok(false)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await
      .map_err(provider_error)?;

    if !inserted {
      return Err(AuthError::EmailInUse);
    }
    debug!(user = %identity.user_id, "account created");
    Ok(identity)
  }

  async fn log_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
    let email = normalise_email(&credentials.email);
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, email, display_name, password_hash
               FROM users WHERE email = ?1",
              rusqlite::params![email],
              |row| {
                Ok(RawUser {
                  user_id:       row.get(0)?,
                  email:         row.get(1)?,
                  display_name:  row.get(2)?,
                  password_hash: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await
      .map_err(provider_error)?;

    // Unknown email and wrong password are indistinguishable to the caller.
    match raw {
      Some(user) if verify_password(&credentials.password, &user.password_hash) => {
        Ok(user.into_identity())
      }
      _ => Err(AuthError::InvalidCredentials),
    }
  }

  async fn log_out(&self, identity: &Identity) -> Result<(), AuthError> {
    debug!(user = %identity.user_id, "signed out");
    Ok(())
  }
}
