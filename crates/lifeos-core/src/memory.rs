//! An in-process [`DocumentStore`], for tests and ephemeral use.

use std::{
  collections::HashMap,
  convert::Infallible,
  sync::{
    Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
  },
};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::store::{
  Change, ChangeKind, Document, DocumentStore, Fields, Filter, owner_of,
};

/// Change notifications buffered per subscriber before it lags.
const CHANGE_CAPACITY: usize = 256;

/// Keeps every collection as a `Vec` in insertion order.
#[derive(Debug)]
pub struct MemoryStore {
  collections: Mutex<HashMap<String, Vec<Document>>>,
  changes:     broadcast::Sender<Change>,
  writes:      AtomicUsize,
}

impl Default for MemoryStore {
  fn default() -> Self { Self::new() }
}

impl MemoryStore {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    Self {
      collections: Mutex::new(HashMap::new()),
      changes,
      writes: AtomicUsize::new(0),
    }
  }

  /// Number of successful writes (insert, merge, remove) so far.
  pub fn write_count(&self) -> usize { self.writes.load(Ordering::SeqCst) }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Document>>> {
    // A panic while holding the lock cannot leave a half-applied write.
    self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// The owner check and the write happen under one lock.
  fn merge_checked(
    &self,
    collection: &str,
    id: Uuid,
    fields: Fields,
    only_unowned: bool,
  ) -> Option<Document> {
    let (doc, previous_owner) = {
      let mut collections = self.lock();
      let doc = collections
        .get_mut(collection)
        .and_then(|docs| docs.iter_mut().find(|d| d.id == id))?;
      let previous_owner = owner_of(&doc.fields);
      if only_unowned && previous_owner.is_some() {
        return None;
      }
      doc.fields.extend(fields);
      (doc.clone(), previous_owner)
    };
    self.publish(Change {
      collection: collection.to_owned(),
      id,
      kind: ChangeKind::Modified,
      owner: doc.owner(),
      previous_owner,
    });
    Some(doc)
  }

  fn publish(&self, change: Change) {
    self.writes.fetch_add(1, Ordering::SeqCst);
    // No receivers is fine.
    let _ = self.changes.send(change);
  }
}

impl DocumentStore for MemoryStore {
  type Error = Infallible;

  async fn insert(&self, collection: &str, fields: Fields) -> Result<Document, Infallible> {
    let doc = Document { id: Uuid::new_v4(), fields };
    self
      .lock()
      .entry(collection.to_owned())
      .or_default()
      .push(doc.clone());
    self.publish(Change {
      collection:     collection.to_owned(),
      id:             doc.id,
      kind:           ChangeKind::Added,
      owner:          doc.owner(),
      previous_owner: None,
    });
    Ok(doc)
  }

  async fn merge(
    &self,
    collection: &str,
    id: Uuid,
    fields: Fields,
  ) -> Result<Option<Document>, Infallible> {
    Ok(self.merge_checked(collection, id, fields, false))
  }

  async fn merge_if_unowned(
    &self,
    collection: &str,
    id: Uuid,
    fields: Fields,
  ) -> Result<Option<Document>, Infallible> {
    Ok(self.merge_checked(collection, id, fields, true))
  }

  async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, Infallible> {
    let removed = {
      let mut collections = self.lock();
      collections.get_mut(collection).and_then(|docs| {
        let index = docs.iter().position(|d| d.id == id)?;
        Some(docs.remove(index))
      })
    };
    let Some(doc) = removed else {
      return Ok(false);
    };
    let owner = doc.owner();
    self.publish(Change {
      collection: collection.to_owned(),
      id,
      kind: ChangeKind::Removed,
      owner: owner.clone(),
      previous_owner: owner,
    });
    Ok(true)
  }

  async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, Infallible> {
    Ok(
      self
        .lock()
        .get(collection)
        .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()),
    )
  }

  async fn query(
    &self,
    collection: &str,
    filter: &Filter,
  ) -> Result<Vec<Document>, Infallible> {
    Ok(
      self
        .lock()
        .get(collection)
        .map(|docs| {
          docs
            .iter()
            .filter(|d| filter.matches(d.owner().as_ref()))
            .cloned()
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  fn changes(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }
}

#[cfg(test)]
mod tests {
  use serde_json::{Value, json};

  use super::*;
  use crate::record::UserId;

  fn fields(v: Value) -> Fields {
    match v {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[tokio::test]
  async fn merge_is_shallow() {
    let store = MemoryStore::new();
    let doc = store
      .insert("tasks", fields(json!({ "title": "a", "nested": { "x": 1, "y": 2 } })))
      .await
      .unwrap();
    let merged = store
      .merge("tasks", doc.id, fields(json!({ "nested": { "x": 3 } })))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(merged.fields["title"], "a");
    assert_eq!(merged.fields["nested"], json!({ "x": 3 }));
  }

  #[tokio::test]
  async fn query_filters_by_owner() {
    let store = MemoryStore::new();
    store.insert("tasks", fields(json!({ "userId": "u1" }))).await.unwrap();
    store.insert("tasks", fields(json!({ "userId": "u2" }))).await.unwrap();
    store.insert("tasks", fields(json!({ "userId": "" }))).await.unwrap();
    store.insert("tasks", fields(json!({}))).await.unwrap();

    let mine = store
      .query("tasks", &Filter::OwnedBy(UserId::from("u1")))
      .await
      .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(store.query("tasks", &Filter::Unowned).await.unwrap().len(), 2);
    assert!(store.query("jobs", &Filter::Unowned).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn changes_carry_owner_before_and_after() {
    let store = MemoryStore::new();
    let mut rx = store.changes();
    let doc = store.insert("tasks", fields(json!({}))).await.unwrap();
    store
      .merge("tasks", doc.id, fields(json!({ "userId": "u1" })))
      .await
      .unwrap();
    assert!(store.remove("tasks", doc.id).await.unwrap());
    assert!(!store.remove("tasks", doc.id).await.unwrap());

    let added = rx.recv().await.unwrap();
    assert_eq!((added.kind, added.owner), (ChangeKind::Added, None));
    let adopted = rx.recv().await.unwrap();
    assert_eq!(adopted.owner, Some(UserId::from("u1")));
    assert_eq!(adopted.previous_owner, None);
    let removed = rx.recv().await.unwrap();
    assert_eq!(removed.kind, ChangeKind::Removed);
    assert_eq!(store.write_count(), 3);
  }

  #[tokio::test]
  async fn merge_if_unowned_leaves_owned_documents_alone() {
    let store = MemoryStore::new();
    let doc = store.insert("tasks", fields(json!({ "title": "a" }))).await.unwrap();

    let claimed = store
      .merge_if_unowned("tasks", doc.id, fields(json!({ "userId": "u1" })))
      .await
      .unwrap();
    assert_eq!(claimed.unwrap().owner(), Some(UserId::from("u1")));

    let again = store
      .merge_if_unowned("tasks", doc.id, fields(json!({ "userId": "u2" })))
      .await
      .unwrap();
    assert!(again.is_none());
    let stored = store.get("tasks", doc.id).await.unwrap().unwrap();
    assert_eq!(stored.owner(), Some(UserId::from("u1")));
    assert_eq!(store.write_count(), 2);
  }
}
