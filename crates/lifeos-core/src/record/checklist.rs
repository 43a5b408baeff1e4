//! Document checklists nested inside application records.
//!
//! Every item carries its own stable id so it can be toggled, renamed or
//! removed without relying on its position. Early documents stored items
//! without ids (and with `isReady` instead of `isCompleted`); [`repair`]
//! brings those up to shape.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{Record, lenient};
use crate::{Error, Result, store::Fields};

/// Field name under which records keep their checklist.
pub const CHECKLIST_FIELD: &str = "documents";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
  pub id:           Uuid,
  pub name:         String,
  #[serde(default)]
  pub is_completed: bool,
  #[serde(default = "required_by_default")]
  pub is_required:  bool,
  #[serde(default, deserialize_with = "lenient::text")]
  pub notes:        Option<String>,
}

fn required_by_default() -> bool { true }

impl ChecklistItem {
  pub fn new(name: impl Into<String>, is_required: bool) -> Self {
    Self {
      id: Uuid::new_v4(),
      name: name.into(),
      is_completed: false,
      is_required,
      notes: None,
    }
  }
}

/// An ordered list of [`ChecklistItem`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checklist(Vec<ChecklistItem>);

impl Checklist {
  pub fn new(items: Vec<ChecklistItem>) -> Self { Self(items) }

  /// Fresh items, each with a new id, from `(name, required)` pairs.
  pub fn from_names(names: &[(&str, bool)]) -> Self {
    Self(
      names
        .iter()
        .map(|(name, required)| ChecklistItem::new(*name, *required))
        .collect(),
    )
  }

  pub fn items(&self) -> &[ChecklistItem] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn get(&self, id: Uuid) -> Option<&ChecklistItem> {
    self.0.iter().find(|item| item.id == id)
  }

  fn get_mut(&mut self, id: Uuid) -> Result<&mut ChecklistItem> {
    self
      .0
      .iter_mut()
      .find(|item| item.id == id)
      .ok_or(Error::ChecklistItemNotFound(id))
  }

  /// Flip an item's completion flag and return the new value.
  pub fn toggle(&mut self, id: Uuid) -> Result<bool> {
    let item = self.get_mut(id)?;
    item.is_completed = !item.is_completed;
    Ok(item.is_completed)
  }

  pub fn rename(&mut self, id: Uuid, name: impl Into<String>) -> Result<()> {
    let name = name.into();
    if name.trim().is_empty() {
      return Err(Error::Invalid("checklist item name is blank".into()));
    }
    self.get_mut(id)?.name = name;
    Ok(())
  }

  pub fn set_required(&mut self, id: Uuid, required: bool) -> Result<()> {
    self.get_mut(id)?.is_required = required;
    Ok(())
  }

  pub fn set_notes(&mut self, id: Uuid, notes: Option<String>) -> Result<()> {
    self.get_mut(id)?.notes = notes.filter(|n| !n.trim().is_empty());
    Ok(())
  }

  /// Append a new item and return its id.
  pub fn push(&mut self, name: impl Into<String>, is_required: bool) -> Result<Uuid> {
    let item = ChecklistItem::new(name, is_required);
    if item.name.trim().is_empty() {
      return Err(Error::Invalid("checklist item name is blank".into()));
    }
    let id = item.id;
    self.0.push(item);
    Ok(id)
  }

  pub fn remove(&mut self, id: Uuid) -> Result<ChecklistItem> {
    let index = self
      .0
      .iter()
      .position(|item| item.id == id)
      .ok_or(Error::ChecklistItemNotFound(id))?;
    Ok(self.0.remove(index))
  }

  /// `(completed, total)`.
  pub fn progress(&self) -> (usize, usize) {
    let done = self.0.iter().filter(|item| item.is_completed).count();
    (done, self.0.len())
  }

  /// Whether every required item is completed.
  pub fn is_ready(&self) -> bool {
    self.0.iter().all(|item| item.is_completed || !item.is_required)
  }
}

/// Records that carry a [`Checklist`].
pub trait HasChecklist: Record {
  fn checklist(&self) -> &Checklist;

  /// A patch replacing the whole checklist.
  fn checklist_patch(checklist: Checklist) -> Self::Patch;
}

// ─── Legacy repair ───────────────────────────────────────────────────────────

/// Deterministic id for a legacy item, so the same stored item reads with the
/// same id until it is written back.
fn legacy_item_id(parent: Uuid, key: &str) -> Uuid {
  Uuid::new_v5(&parent, key.as_bytes())
}

fn default_items(parent: Uuid, defaults: &[(&str, bool)]) -> Value {
  Value::Array(
    defaults
      .iter()
      .map(|(name, required)| {
        json!({
          "id": legacy_item_id(parent, &format!("default:{name}")),
          "name": name,
          "isCompleted": false,
          "isRequired": required,
          "notes": null,
        })
      })
      .collect(),
  )
}

fn repair_item(parent: Uuid, index: usize, item: &mut Value) -> bool {
  // A bare string was an early shorthand for an item name.
  if let Value::String(name) = item {
    *item = json!({ "name": name.clone() });
  }
  let Value::Object(obj) = item else {
    *item = json!({
      "id": legacy_item_id(parent, &format!("{index}:")),
      "name": "Unnamed Document",
      "isCompleted": false,
      "isRequired": true,
    });
    return true;
  };

  let mut changed = false;

  let name_missing = !obj
    .get("name")
    .and_then(Value::as_str)
    .is_some_and(|n| !n.trim().is_empty());
  if name_missing {
    obj.insert("name".to_owned(), Value::from("Unnamed Document"));
    changed = true;
  }

  let id_ok = obj
    .get("id")
    .and_then(Value::as_str)
    .is_some_and(|s| Uuid::parse_str(s).is_ok());
  if !id_ok {
    let key = match obj.get("id").and_then(Value::as_str) {
      Some(old) if !old.is_empty() => old.to_owned(),
      _ => {
        let name = obj.get("name").and_then(Value::as_str).unwrap_or_default();
        format!("{index}:{name}")
      }
    };
    obj.insert("id".to_owned(), json!(legacy_item_id(parent, &key)));
    changed = true;
  }

  if let Some(ready) = obj.remove("isReady") {
    if !obj.get("isCompleted").is_some_and(Value::is_boolean) {
      obj.insert("isCompleted".to_owned(), Value::Bool(ready.as_bool().unwrap_or(false)));
    }
    changed = true;
  }
  if !obj.get("isCompleted").is_some_and(Value::is_boolean) {
    obj.insert("isCompleted".to_owned(), Value::Bool(false));
    changed = true;
  }
  if !obj.get("isRequired").is_some_and(Value::is_boolean) {
    obj.insert("isRequired".to_owned(), Value::Bool(true));
    changed = true;
  }

  changed
}

/// Re-key items whose id an earlier item of the same checklist already uses.
/// Runs after [`repair_item`], so every item has a UUID string id.
fn dedupe_ids(parent: Uuid, items: &mut [Value]) -> bool {
  let mut seen = HashSet::new();
  let mut changed = false;
  for (index, item) in items.iter_mut().enumerate() {
    let Some(obj) = item.as_object_mut() else {
      continue;
    };
    let Some(mut id) = obj
      .get("id")
      .and_then(Value::as_str)
      .and_then(|s| Uuid::parse_str(s).ok())
    else {
      continue;
    };
    while seen.contains(&id) {
      id = legacy_item_id(parent, &format!("{index}:{id}"));
      obj.insert("id".to_owned(), json!(id));
      changed = true;
    }
    seen.insert(id);
  }
  changed
}

/// Bring the checklist of document `parent` up to the current item shape,
/// filling in `defaults` when the document has none at all.
///
/// Idempotent; returns whether anything changed.
pub fn repair(parent: Uuid, fields: &mut Fields, defaults: &[(&str, bool)]) -> bool {
  match fields.get_mut(CHECKLIST_FIELD) {
    Some(Value::Array(items)) => {
      let mut changed = false;
      for (index, item) in items.iter_mut().enumerate() {
        changed |= repair_item(parent, index, item);
      }
      changed |= dedupe_ids(parent, items);
      changed
    }
    _ => {
      fields.insert(CHECKLIST_FIELD.to_owned(), default_items(parent, defaults));
      true
    }
  }
}
