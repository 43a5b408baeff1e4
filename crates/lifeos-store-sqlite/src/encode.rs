//! Conversions between core types and the plain-text representations stored
//! in SQLite columns.
//!
//! UUIDs are stored as hyphenated lowercase strings, document bodies as
//! compact JSON objects, timestamps as RFC 3339 strings.

use chrono::{DateTime, Utc};
use lifeos_core::{
  session::Identity,
  store::{Document, Fields, owner_of},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Documents ───────────────────────────────────────────────────────────────

/// Value for the `owner_id` column.
pub fn encode_owner(fields: &Fields) -> Option<String> {
  owner_of(fields).map(|owner| owner.to_string())
}

pub fn encode_body(fields: &Fields) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

/// Parse a stored body. `collection` and `id` only label the error.
pub fn decode_body(collection: &str, id: &str, body: &str) -> Result<Fields> {
  match serde_json::from_str(body)? {
    Value::Object(fields) => Ok(fields),
    _ => Err(Error::CorruptDocument {
      collection: collection.to_owned(),
      id:         id.to_owned(),
    }),
  }
}

/// Column values of one `documents` row.
pub struct RawDocument {
  pub doc_id:    String,
  pub body_json: String,
}

impl RawDocument {
  pub fn into_document(self, collection: &str) -> Result<Document> {
    Ok(Document {
      id:     decode_uuid(&self.doc_id)?,
      fields: decode_body(collection, &self.doc_id, &self.body_json)?,
    })
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// Column values of one `users` row.
pub struct RawUser {
  pub user_id:       String,
  pub email:         String,
  pub display_name:  String,
  pub password_hash: String,
}

impl RawUser {
  pub fn into_identity(self) -> Identity {
    Identity {
      user_id:      self.user_id.into(),
      email:        self.email,
      display_name: self.display_name,
    }
  }
}

/// Emails are matched case-insensitively and without surrounding blanks.
pub fn normalise_email(email: &str) -> String { email.trim().to_lowercase() }
