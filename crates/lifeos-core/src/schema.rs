//! The boundary between schemaless [`Document`]s and typed [`Stored`]
//! records.
//!
//! Reading runs the record's upgrade hook, fills in missing metadata and
//! applies field defaults, so a document written by any earlier client
//! decodes. Writing stamps the store-managed metadata and the current
//! schema version.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{
  Error, Result,
  record::{Record, Stored, UserId},
  store::{Document, Fields, OWNER_FIELD, owner_of},
};

pub const SCHEMA_VERSION_FIELD: &str = "schemaVersion";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields a patch may never set.
const RESERVED_FIELDS: &[&str] = &[
  "id",
  OWNER_FIELD,
  CREATED_AT_FIELD,
  UPDATED_AT_FIELD,
  SCHEMA_VERSION_FIELD,
];

/// Render a timestamp the way every document stores it.
pub fn timestamp(at: DateTime<Utc>) -> Value {
  Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Accepts RFC 3339 strings and the `{ seconds, nanoseconds }` objects some
/// older documents hold.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
  match value {
    Value::String(s) => DateTime::parse_from_rfc3339(s)
      .ok()
      .map(|t| t.with_timezone(&Utc)),
    Value::Object(obj) => {
      let secs = obj.get("seconds").and_then(Value::as_i64)?;
      let nanos = obj
        .get("nanoseconds")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
      DateTime::from_timestamp(secs, nanos)
    }
    _ => None,
  }
}

/// Version a document was written at. Documents predating the field are 1.
pub fn stored_version(fields: &Fields) -> u32 {
  fields
    .get(SCHEMA_VERSION_FIELD)
    .and_then(Value::as_u64)
    .and_then(|v| u32::try_from(v).ok())
    .unwrap_or(1)
}

// ─── Decode ──────────────────────────────────────────────────────────────────

/// A decoded record, plus what it would take to bring the stored document up
/// to date.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
  pub record: Stored<T>,
  /// Fields to merge into the stored document to repair it, if it needs
  /// repairing. Keys the upgrade dropped are set to `null`.
  pub repair: Option<Fields>,
}

impl<T> Decoded<T> {
  pub fn needs_repair(&self) -> bool { self.repair.is_some() }
}

/// Decode a document into a typed record of `T`.
pub fn decode<T: Record>(doc: &Document) -> Result<Decoded<T>> {
  if owner_of(&doc.fields).is_none() {
    return Err(Error::MissingOwner { collection: T::COLLECTION, id: doc.id });
  }

  let version = stored_version(&doc.fields);
  let mut fields = doc.fields.clone();
  fields.remove(SCHEMA_VERSION_FIELD);
  fields.remove("id");

  let mut changed = T::upgrade(doc.id, version, &mut fields);

  let created = fields.get(CREATED_AT_FIELD).and_then(parse_timestamp);
  let updated = fields.get(UPDATED_AT_FIELD).and_then(parse_timestamp);
  let created_at = created.or(updated).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
  let updated_at = updated.unwrap_or(created_at);
  for (key, at, was) in [
    (CREATED_AT_FIELD, created_at, created),
    (UPDATED_AT_FIELD, updated_at, updated),
  ] {
    let normalised = timestamp(at);
    if was.is_none() || fields.get(key) != Some(&normalised) {
      // Reformatting a readable value alone is not drift.
      changed |= was.is_none();
      fields.insert(key.to_owned(), normalised);
    }
  }

  let repair = (changed || version < T::SCHEMA_VERSION).then(|| {
    let mut patch = fields.clone();
    for key in doc.fields.keys() {
      if !fields.contains_key(key) && key != "id" && key != SCHEMA_VERSION_FIELD {
        patch.insert(key.clone(), Value::Null);
      }
    }
    patch.insert(SCHEMA_VERSION_FIELD.to_owned(), Value::from(T::SCHEMA_VERSION));
    patch
  });

  let mut body = fields;
  body.insert("id".to_owned(), Value::String(doc.id.to_string()));
  let record: Stored<T> = serde_json::from_value(Value::Object(body))?;

  Ok(Decoded { record, repair })
}

// ─── Encode ──────────────────────────────────────────────────────────────────

fn to_fields(value: &impl Serialize) -> Result<Fields> {
  match serde_json::to_value(value)? {
    Value::Object(map) => Ok(map),
    other => Err(Error::Invalid(format!(
      "record must serialise to an object, got {other}"
    ))),
  }
}

/// Fields of a new document holding `record`, owned by `owner`.
pub fn encode_new<T: Record>(
  record: &T,
  owner: &UserId,
  now: DateTime<Utc>,
) -> Result<Fields> {
  let mut fields = to_fields(record)?;
  for key in RESERVED_FIELDS {
    fields.remove(*key);
  }
  fields.insert(OWNER_FIELD.to_owned(), Value::String(owner.to_string()));
  fields.insert(CREATED_AT_FIELD.to_owned(), timestamp(now));
  fields.insert(UPDATED_AT_FIELD.to_owned(), timestamp(now));
  fields.insert(SCHEMA_VERSION_FIELD.to_owned(), Value::from(T::SCHEMA_VERSION));
  Ok(fields)
}

/// Fields to merge for `patch`, with `updatedAt` re-stamped.
///
/// The schema version is left alone: a patch does not upgrade the fields it
/// doesn't mention.
pub fn encode_patch<T: Record>(
  patch: &T::Patch,
  now: DateTime<Utc>,
) -> Result<Fields> {
  let mut fields = to_fields(patch)?;
  for key in RESERVED_FIELDS {
    fields.remove(*key);
  }
  fields.insert(UPDATED_AT_FIELD.to_owned(), timestamp(now));
  Ok(fields)
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::record::{MasterApplication, Task, TaskPatch};

  fn doc(v: Value) -> Document {
    match v {
      Value::Object(fields) => Document { id: Uuid::new_v4(), fields },
      _ => unreachable!(),
    }
  }

  #[test]
  fn current_document_needs_no_repair() {
    let now = Utc::now();
    let fields = encode_new(&Task::titled("Write spec"), &UserId::from("u1"), now).unwrap();
    let decoded = decode::<Task>(&Document { id: Uuid::new_v4(), fields }).unwrap();
    assert!(!decoded.needs_repair());
    assert_eq!(decoded.record.record.title, "Write spec");
    assert_eq!(decoded.record.user_id, UserId::from("u1"));
    assert_eq!(decoded.record.created_at, decoded.record.updated_at);
  }

  #[test]
  fn unowned_document_is_rejected() {
    let err = decode::<Task>(&doc(json!({ "title": "x" }))).unwrap_err();
    assert!(matches!(err, Error::MissingOwner { collection: "tasks", .. }));
  }

  #[test]
  fn missing_timestamps_are_filled_and_flagged() {
    let decoded = decode::<Task>(&doc(json!({
      "userId": "u1",
      "title": "Old",
      "schemaVersion": 2,
    })))
    .unwrap();
    assert!(decoded.needs_repair());
    assert_eq!(decoded.record.created_at, DateTime::<Utc>::UNIX_EPOCH);
  }

  #[test]
  fn legacy_timestamp_objects_are_understood() {
    let decoded = decode::<Task>(&doc(json!({
      "userId": "u1",
      "createdAt": { "seconds": 1_700_000_000, "nanoseconds": 0 },
      "updatedAt": "2023-11-14T22:13:20Z",
    })))
    .unwrap();
    assert_eq!(decoded.record.created_at.timestamp(), 1_700_000_000);
  }

  #[test]
  fn repair_nulls_keys_the_upgrade_dropped() {
    let decoded = decode::<Task>(&doc(json!({
      "userId": "u1",
      "createdAt": "2024-01-01T00:00:00Z",
      "updatedAt": "2024-01-01T00:00:00Z",
      "recurrenceType": "daily",
    })))
    .unwrap();
    let repair = decoded.repair.unwrap();
    assert_eq!(repair["recurringType"], "daily");
    assert_eq!(repair["recurrenceType"], Value::Null);
    assert_eq!(repair[SCHEMA_VERSION_FIELD], 2);
  }

  #[test]
  fn repaired_document_reads_clean() {
    let mut stored = doc(json!({
      "userId": "u1",
      "createdAt": "2024-01-01T00:00:00Z",
      "updatedAt": "2024-01-01T00:00:00Z",
      "documents": [{ "name": "CV", "isReady": true }],
    }));
    let first = decode::<MasterApplication>(&stored).unwrap();
    for (k, v) in first.repair.clone().unwrap() {
      stored.fields.insert(k, v);
    }
    let second = decode::<MasterApplication>(&stored).unwrap();
    assert!(!second.needs_repair());
    assert_eq!(
      first.record.record.documents.items()[0].id,
      second.record.record.documents.items()[0].id
    );
  }

  #[test]
  fn patch_cannot_touch_reserved_fields() {
    let now = Utc::now();
    let fields = encode_patch::<Task>(&TaskPatch::completed(true), now).unwrap();
    assert_eq!(fields["isCompleted"], true);
    assert_eq!(fields[UPDATED_AT_FIELD], timestamp(now));
    assert!(!fields.contains_key(OWNER_FIELD));
    assert!(!fields.contains_key(CREATED_AT_FIELD));
    assert!(!fields.contains_key(SCHEMA_VERSION_FIELD));
  }
}
