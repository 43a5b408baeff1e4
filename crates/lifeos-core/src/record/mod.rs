//! Record schemas and the envelope every persisted record travels in.
//!
//! A record type (`Task`, `MasterApplication`, ...) describes only its own
//! domain fields. The store-managed fields (`id`, `userId`, `createdAt`,
//! `updatedAt`) live in [`Stored`], which flattens the record into a single
//! camelCase JSON object on the wire.

pub mod checklist;
pub mod internship;
pub mod job;
pub mod link;
pub mod master;
pub mod scholarship;
pub mod task;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Result, store::Fields};

pub use checklist::{Checklist, ChecklistItem, HasChecklist};
pub use internship::{ErasmusInternship, ErasmusStatus, InternshipPatch};
pub use job::{JobApplication, JobPatch, JobStatus};
pub use link::{LinkCategory, LinkPatch, UsefulLink};
pub use master::{EnglishReq, MasterAppType, MasterApplication, MasterPatch};
pub use scholarship::{
  LinkedUniversity, ScholarshipPatch, ScholarshipProgram, ScholarshipStatus,
};
pub use task::{RecurringType, Task, TaskPatch};

// ─── Owner ───────────────────────────────────────────────────────────────────

/// Opaque identifier of a user, as assigned by the identity provider.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for UserId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for UserId {
  fn from(s: String) -> Self { Self(s) }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Shared vocabulary ───────────────────────────────────────────────────────

/// Urgency shared by most record types. The derived ordering sorts the most
/// urgent first.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Priority {
  High,
  #[default]
  Medium,
  Low,
}

// ─── Record trait ────────────────────────────────────────────────────────────

/// A record type stored in its own collection.
pub trait Record:
  Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
  /// Name of the backing collection.
  const COLLECTION: &'static str;

  /// Bumped whenever [`Record::upgrade`] learns a new legacy shape.
  const SCHEMA_VERSION: u32 = 1;

  /// Partial update accepted by
  /// [`Collection::update`](crate::collection::Collection::update). Fields
  /// left as `None` are not sent to the store.
  type Patch: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static;

  /// Rewrite legacy field shapes of the document `id` in place before it is
  /// decoded. `from_version` is the stored `schemaVersion` (1 when absent).
  ///
  /// Must be idempotent. Returns whether anything was changed.
  fn upgrade(_id: Uuid, _from_version: u32, _fields: &mut Fields) -> bool {
    false
  }

  /// Reject user input that would produce a meaningless record.
  fn validate(&self) -> Result<()> { Ok(()) }

  /// Same as [`Record::validate`], for the fields a patch sets.
  fn validate_patch(_patch: &Self::Patch) -> Result<()> { Ok(()) }
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// A record as persisted: store-managed metadata plus the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
  pub id:         Uuid,
  pub user_id:    UserId,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub record:     T,
}

// ─── Lenient field decoding ──────────────────────────────────────────────────

/// Deserialisers applied to optional fields at the storage boundary. Older
/// clients wrote `""` where a value was absent; those read back as `None`.
pub mod lenient {
  use chrono::NaiveDate;
  use serde::{Deserialize, Deserializer};

  pub fn text<'de, D>(d: D) -> Result<Option<String>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
  }

  /// Accepts `YYYY-MM-DD`, or a full timestamp whose date part is used.
  /// Anything unparseable reads as `None`.
  pub fn date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.and_then(|s| {
      let s = s.trim();
      s.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
    }))
  }

  /// Any JSON number, integral or not. Other values read as `None`.
  pub fn number<'de, D>(d: D) -> Result<Option<f64>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = Option::<serde_json::Value>::deserialize(d)?;
    Ok(raw.as_ref().and_then(serde_json::Value::as_f64))
  }

  /// For patch fields: absent → `None`, `null` → `Some(None)` (clear the
  /// field), value → `Some(Some(v))`. Pair with `#[serde(default)]`.
  pub fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
  where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
  {
    Option::<T>::deserialize(d).map(Some)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn priority_orders_most_urgent_first() {
    let mut ps = vec![Priority::Low, Priority::High, Priority::Medium];
    ps.sort();
    assert_eq!(ps, vec![Priority::High, Priority::Medium, Priority::Low]);
  }

  #[test]
  fn priority_wire_format() {
    assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"HIGH\"");
    assert_eq!(Priority::Low.to_string(), "LOW");
  }

  #[test]
  fn stored_flattens_record_fields() {
    let stored = Stored {
      id:         Uuid::nil(),
      user_id:    UserId::from("u1"),
      created_at: DateTime::<Utc>::UNIX_EPOCH,
      updated_at: DateTime::<Utc>::UNIX_EPOCH,
      record:     Task::titled("Write spec"),
    };
    let json = serde_json::to_value(&stored).unwrap();
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["title"], "Write spec");
    assert!(json.get("record").is_none());
  }
}
