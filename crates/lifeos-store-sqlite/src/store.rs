//! [`SqliteStore`], the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use lifeos_core::{
  record::UserId,
  store::{Change, ChangeKind, Document, DocumentStore, Fields, Filter},
};

use crate::{
  Error, Result,
  encode::{RawDocument, decode_body, encode_body, encode_owner, encode_uuid},
  schema::SCHEMA,
};

/// Change notifications buffered per subscriber before it lags.
const CHANGE_CAPACITY: usize = 1024;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A LifeOS document store backed by a single SQLite file.
///
/// Cloning is cheap. The connection and the change feed are shared, so a
/// write through any clone is seen by subscribers of every clone.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  changes:         broadcast::Sender<Change>,
}

/// Carry a crate error out of a `call` closure.
fn other(e: Error) -> tokio_rusqlite::Error { tokio_rusqlite::Error::Other(Box::new(e)) }

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
    Ok(Self { conn, changes })
  }

  fn publish(
    &self,
    collection: &str,
    id: Uuid,
    kind: ChangeKind,
    owner: Option<String>,
    previous_owner: Option<String>,
  ) {
    // Nobody listening is fine.
    let _ = self.changes.send(Change {
      collection: collection.to_owned(),
      id,
      kind,
      owner: owner.map(UserId::from),
      previous_owner: previous_owner.map(UserId::from),
    });
  }

  /// Shared body of `merge` and `merge_if_unowned`. With `only_unowned`, a
  /// document that already has an owner is left alone and `None` returned.
  async fn merge_checked(
    &self,
    collection: &str,
    id: Uuid,
    fields: Fields,
    only_unowned: bool,
  ) -> Result<Option<Document>> {
    let coll = collection.to_owned();
    let id_str = encode_uuid(id);

    // Read, merge and write back in one transaction so concurrent merges
    // never drop each other's keys and an owner check cannot go stale.
    let merged: Option<(Option<String>, Fields)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let row: Option<(Option<String>, String)> = tx
          .query_row(
            "SELECT owner_id, body_json FROM documents
             WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![coll, id_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;
        let Some((owner_col, body)) = row else {
          return Ok(None);
        };
        if only_unowned && owner_col.is_some() {
          return Ok(None);
        }

        let mut current = decode_body(&coll, &id_str, &body).map_err(other)?;
        let previous_owner = encode_owner(&current);
        current.extend(fields);
        let new_body = encode_body(&current).map_err(other)?;

        tx.execute(
          "UPDATE documents SET owner_id = ?3, body_json = ?4
           WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![coll, id_str, encode_owner(&current), new_body],
        )?;
        tx.commit()?;
        Ok(Some((previous_owner, current)))
      })
      .await?;

    let Some((previous_owner, fields)) = merged else {
      return Ok(None);
    };
    self.publish(
      collection,
      id,
      ChangeKind::Modified,
      encode_owner(&fields),
      previous_owner,
    );
    Ok(Some(Document { id, fields }))
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn insert(&self, collection: &str, fields: Fields) -> Result<Document> {
    let id = Uuid::new_v4();
    let coll = collection.to_owned();
    let id_str = encode_uuid(id);
    let owner = encode_owner(&fields);
    let body = encode_body(&fields)?;

    let owner_col = owner.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, doc_id, owner_id, body_json)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![coll, id_str, owner_col, body],
        )?;
        Ok(())
      })
      .await?;

    self.publish(collection, id, ChangeKind::Added, owner, None);
    Ok(Document { id, fields })
  }

  async fn merge(
    &self,
    collection: &str,
    id: Uuid,
    fields: Fields,
  ) -> Result<Option<Document>> {
    self.merge_checked(collection, id, fields, false).await
  }

  async fn merge_if_unowned(
    &self,
    collection: &str,
    id: Uuid,
    fields: Fields,
  ) -> Result<Option<Document>> {
    self.merge_checked(collection, id, fields, true).await
  }

  async fn remove(&self, collection: &str, id: Uuid) -> Result<bool> {
    let coll = collection.to_owned();
    let id_str = encode_uuid(id);

    let removed: Option<Option<String>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2
               RETURNING owner_id",
              rusqlite::params![coll, id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    let Some(owner) = removed else {
      return Ok(false);
    };
    self.publish(collection, id, ChangeKind::Removed, owner.clone(), owner);
    Ok(true)
  }

  async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>> {
    let coll = collection.to_owned();
    let id_str = encode_uuid(id);

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT doc_id, body_json FROM documents
               WHERE collection = ?1 AND doc_id = ?2",
              rusqlite::params![coll, id_str],
              |row| {
                Ok(RawDocument {
                  doc_id:    row.get(0)?,
                  body_json: row.get(1)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(|r| r.into_document(collection)).transpose()
  }

  async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
    let coll = collection.to_owned();
    let owner: Option<String> = match filter {
      Filter::OwnedBy(user) => Some(user.to_string()),
      Filter::Unowned => None,
    };

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        // `IS` matches NULL against NULL, so one statement serves both filters.
        let mut stmt = conn.prepare(
          "SELECT doc_id, body_json FROM documents
           WHERE collection = ?1 AND owner_id IS ?2
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![coll, owner], |row| {
            Ok(RawDocument {
              doc_id:    row.get(0)?,
              body_json: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      raws
        .into_iter()
        .filter_map(|raw| match raw.into_document(collection) {
          Ok(doc) => Some(doc),
          Err(e) => {
            warn!(collection, error = %e, "skipping unreadable row");
            None
          }
        })
        .collect(),
    )
  }

  fn changes(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }
}
