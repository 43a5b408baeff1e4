//! The `DocumentStore` trait and supporting types.
//!
//! The trait is implemented by backing stores (e.g. `lifeos-store-sqlite`, or
//! [`MemoryStore`](crate::memory::MemoryStore) in tests). Everything above it
//! goes through [`Collection`](crate::collection::Collection), which adds the
//! owner scoping, timestamps and typed decoding; a store itself only deals in
//! schemaless JSON objects.

use std::future::Future;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::record::UserId;

/// The top-level fields of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// Name of the field holding a document's owner.
pub const OWNER_FIELD: &str = "userId";

// ─── Documents ───────────────────────────────────────────────────────────────

/// A schemaless document as held by the backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  /// Store-assigned identifier; never changes.
  pub id:     Uuid,
  pub fields: Fields,
}

impl Document {
  pub fn owner(&self) -> Option<UserId> { owner_of(&self.fields) }
}

/// Read the owner out of a field map. Empty strings count as no owner.
pub fn owner_of(fields: &Fields) -> Option<UserId> {
  fields
    .get(OWNER_FIELD)
    .and_then(Value::as_str)
    .filter(|s| !s.is_empty())
    .map(UserId::from)
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Which documents of a collection a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  /// Documents whose owner field equals the given user.
  OwnedBy(UserId),
  /// Legacy documents written before the owner field existed.
  Unowned,
}

impl Filter {
  pub fn matches(&self, owner: Option<&UserId>) -> bool {
    match (self, owner) {
      (Self::OwnedBy(want), Some(have)) => want == have,
      (Self::OwnedBy(_), None) => false,
      (Self::Unowned, owner) => owner.is_none(),
    }
  }
}

// ─── Change notification ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Added,
  Modified,
  Removed,
}

/// Pushed by the store after every successful write.
#[derive(Debug, Clone)]
pub struct Change {
  pub collection:     String,
  pub id:             Uuid,
  pub kind:           ChangeKind,
  /// Owner after the write; for removals, the owner of the removed document.
  pub owner:          Option<UserId>,
  /// Owner before the write. Differs from `owner` only when a legacy
  /// document is adopted.
  pub previous_owner: Option<UserId>,
}

impl Change {
  /// Whether a live query on `collection` scoped to `owner` must re-run.
  pub fn affects(&self, collection: &str, owner: &UserId) -> bool {
    self.collection == collection
      && (self.owner.as_ref() == Some(owner)
        || self.previous_owner.as_ref() == Some(owner))
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a document database with live change notification.
///
/// Access rules (who may touch which document) are not the store's concern
/// at this level; the serving layer checks ownership before it calls in.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new document and return it with its store-assigned id.
  fn insert<'a>(
    &'a self,
    collection: &'a str,
    fields: Fields,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'a;

  /// Shallow-merge `fields` into an existing document: every given top-level
  /// key replaces the stored one, other keys are untouched.
  ///
  /// Returns `None` if no such document exists.
  fn merge<'a>(
    &'a self,
    collection: &'a str,
    id: Uuid,
    fields: Fields,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// [`merge`](Self::merge), but only while the document has no owner. The
  /// owner check and the write are atomic, so of two concurrent calls on
  /// the same unowned document exactly one succeeds.
  ///
  /// Returns `None` if no such document exists or it is already owned.
  fn merge_if_unowned<'a>(
    &'a self,
    collection: &'a str,
    id: Uuid,
    fields: Fields,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// Hard-delete a document. Returns whether it existed.
  fn remove<'a>(
    &'a self,
    collection: &'a str,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Retrieve a single document. Returns `None` if not found.
  fn get<'a>(
    &'a self,
    collection: &'a str,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// All documents of `collection` matching `filter`, in insertion order.
  fn query<'a>(
    &'a self,
    collection: &'a str,
    filter: &'a Filter,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Subscribe to the change feed. Every successful write after this call is
  /// delivered to the returned receiver.
  fn changes(&self) -> broadcast::Receiver<Change>;
}
