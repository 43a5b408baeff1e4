//! Bringing stored documents up to date for an owner.
//!
//! Two passes, both idempotent:
//!
//! - **adoption** assigns documents written before ownership existed to a
//!   user;
//! - **repair** rewrites an owner's documents whose stored shape is behind
//!   the current schema (see [`schema::decode`]).

use serde_json::Value;
use tracing::{info, warn};

use crate::{
  Error, Result,
  collection::{Collection, Db},
  record::{Record, UserId},
  schema::{self, UPDATED_AT_FIELD},
  store::{DocumentStore, Fields, Filter, OWNER_FIELD},
};

impl<T: Record, S: DocumentStore + 'static> Collection<T, S> {
  /// Assign every unowned document of this collection to `owner`. Returns
  /// how many were adopted; a document another user claimed first is
  /// skipped.
  pub async fn adopt_orphans(&self, owner: &UserId) -> Result<usize> {
    let orphans = self
      .store
      .query(T::COLLECTION, &Filter::Unowned)
      .await
      .map_err(Error::store)?;

    let mut adopted = 0;
    for doc in orphans {
      let mut fields = Fields::new();
      fields.insert(OWNER_FIELD.to_owned(), Value::String(owner.to_string()));
      fields.insert(UPDATED_AT_FIELD.to_owned(), schema::timestamp(self.clock.now()));
      if self
        .store
        .merge_if_unowned(T::COLLECTION, doc.id, fields)
        .await
        .map_err(Error::store)?
        .is_some()
      {
        adopted += 1;
      }
    }
    Ok(adopted)
  }

  /// Rewrite `owner`'s documents that need repair. Returns how many were
  /// rewritten; a second run right after returns 0.
  pub async fn repair(&self, owner: &UserId) -> Result<usize> {
    let docs = self
      .store
      .query(T::COLLECTION, &Filter::OwnedBy(owner.clone()))
      .await
      .map_err(Error::store)?;

    let mut repaired = 0;
    for doc in docs {
      let patch = match schema::decode::<T>(&doc) {
        Ok(decoded) => decoded.repair,
        Err(e) => {
          warn!(collection = T::COLLECTION, id = %doc.id, error = %e, "cannot repair document");
          continue;
        }
      };
      if let Some(patch) = patch {
        self
          .store
          .merge(T::COLLECTION, doc.id, patch)
          .await
          .map_err(Error::store)?;
        repaired += 1;
      }
    }
    Ok(repaired)
  }

  async fn migrate(&self, owner: &UserId, adopt: bool) -> Result<CollectionReport> {
    let adopted = if adopt { self.adopt_orphans(owner).await? } else { 0 };
    let repaired = self.repair(owner).await?;
    Ok(CollectionReport { collection: T::COLLECTION, adopted, repaired })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
  pub collection: &'static str,
  pub adopted:    usize,
  pub repaired:   usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
  pub collections: Vec<CollectionReport>,
}

impl MigrationReport {
  pub fn adopted(&self) -> usize { self.collections.iter().map(|c| c.adopted).sum() }

  pub fn repaired(&self) -> usize { self.collections.iter().map(|c| c.repaired).sum() }

  pub fn is_empty(&self) -> bool { self.adopted() == 0 && self.repaired() == 0 }
}

/// Repair every collection for `owner`, adopting unowned documents first
/// when `adopt` is set.
pub async fn migrate_owner<S: DocumentStore + 'static>(
  db: &Db<S>,
  owner: &UserId,
  adopt: bool,
) -> Result<MigrationReport> {
  let collections = vec![
    db.tasks().migrate(owner, adopt).await?,
    db.jobs().migrate(owner, adopt).await?,
    db.masters().migrate(owner, adopt).await?,
    db.internships().migrate(owner, adopt).await?,
    db.links().migrate(owner, adopt).await?,
    db.scholarships().migrate(owner, adopt).await?,
  ];
  let report = MigrationReport { collections };
  if !report.is_empty() {
    info!(
      %owner,
      adopted = report.adopted(),
      repaired = report.repaired(),
      "migrated stored records"
    );
  }
  Ok(report)
}
