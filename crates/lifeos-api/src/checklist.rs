//! Handlers for the document checklists of masters and scholarships.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/{c}/:id/documents` | Body: `{"name":"CV","isRequired":true}`; 201 |
//! | `POST`   | `/{c}/:id/documents/:item/toggle` | Flips `isCompleted` |
//! | `PATCH`  | `/{c}/:id/documents/:item` | Body: [`ItemPatchBody`] |
//! | `DELETE` | `/{c}/:id/documents/:item` | Returns the updated record |

use axum::{
  Extension, Json, Router,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  routing::{patch, post},
};
use lifeos_core::{
  Db, Error, Stored,
  record::{HasChecklist, lenient},
  session::Identity,
  store::DocumentStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, records::owned};

/// Add the checklist routes for `T` under `/{T::COLLECTION}/:id/documents`.
pub fn routes<T, S>(router: Router<Db<S>>) -> Router<Db<S>>
where
  T: HasChecklist,
  S: DocumentStore + 'static,
{
  let base = format!("/{}/{{id}}/documents", T::COLLECTION);
  router
    .route(&base, post(add_item::<T, S>))
    .route(
      &format!("{base}/{{item}}"),
      patch(edit_item::<T, S>).delete(remove_item::<T, S>),
    )
    .route(&format!("{base}/{{item}}/toggle"), post(toggle_item::<T, S>))
}

// ─── Add ─────────────────────────────────────────────────────────────────────

fn required() -> bool { true }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItemBody {
  pub name:        String,
  #[serde(default = "required")]
  pub is_required: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedItem<T> {
  pub item_id: Uuid,
  pub record:  Stored<T>,
}

/// `POST /{c}/:id/documents`
pub async fn add_item<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewItemBody>,
) -> Result<impl IntoResponse, ApiError>
where
  T: HasChecklist,
  S: DocumentStore + 'static,
{
  let collection = db.collection::<T>();
  owned(&collection, id, &identity).await?;
  let (record, item_id) = collection.add_item(id, body.name, body.is_required).await?;
  Ok((StatusCode::CREATED, Json(AddedItem { item_id, record })))
}

// ─── Edit ────────────────────────────────────────────────────────────────────

/// `POST /{c}/:id/documents/:item/toggle`
pub async fn toggle_item<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path((id, item)): Path<(Uuid, Uuid)>,
) -> Result<Json<Stored<T>>, ApiError>
where
  T: HasChecklist,
  S: DocumentStore + 'static,
{
  let collection = db.collection::<T>();
  owned(&collection, id, &identity).await?;
  Ok(Json(collection.toggle_item(id, item).await?))
}

/// Fields of one checklist item to change. `notes: null` clears the notes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatchBody {
  pub name:        Option<String>,
  pub is_required: Option<bool>,
  #[serde(default, deserialize_with = "lenient::nullable")]
  pub notes:       Option<Option<String>>,
}

/// `PATCH /{c}/:id/documents/:item`
pub async fn edit_item<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path((id, item)): Path<(Uuid, Uuid)>,
  Json(body): Json<ItemPatchBody>,
) -> Result<Json<Stored<T>>, ApiError>
where
  T: HasChecklist,
  S: DocumentStore + 'static,
{
  let collection = db.collection::<T>();
  owned(&collection, id, &identity).await?;
  let (record, ()) = collection
    .edit_checklist(id, move |checklist| {
      checklist.get(item).ok_or(Error::ChecklistItemNotFound(item))?;
      if let Some(name) = body.name {
        checklist.rename(item, name)?;
      }
      if let Some(required) = body.is_required {
        checklist.set_required(item, required)?;
      }
      if let Some(notes) = body.notes {
        checklist.set_notes(item, notes)?;
      }
      Ok(())
    })
    .await?;
  Ok(Json(record))
}

/// `DELETE /{c}/:id/documents/:item`
pub async fn remove_item<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path((id, item)): Path<(Uuid, Uuid)>,
) -> Result<Json<Stored<T>>, ApiError>
where
  T: HasChecklist,
  S: DocumentStore + 'static,
{
  let collection = db.collection::<T>();
  owned(&collection, id, &identity).await?;
  Ok(Json(collection.remove_item(id, item).await?))
}
