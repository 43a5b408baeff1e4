//! Generic CRUD and live-query handlers, mounted once per record type.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/{c}` | The caller's records, oldest first |
//! | `POST`   | `/{c}` | Body: the record; returns 201 + stored record |
//! | `GET`    | `/{c}/:id` | 404 unless owned by the caller |
//! | `PATCH`  | `/{c}/:id` | Body: the record's patch type |
//! | `DELETE` | `/{c}/:id` | 204, also when already gone |
//! | `GET`    | `/{c}/events` | SSE; one `snapshot` event per emission |

use std::convert::Infallible;

use axum::{
  Extension, Json, Router,
  extract::{Path, State},
  http::StatusCode,
  response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
  },
  routing::get,
};
use futures_util::{Stream, stream};
use lifeos_core::{
  Collection, Db, Record, Stored, session::Identity, store::DocumentStore,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Add the routes for record type `T` under `/{T::COLLECTION}`.
pub fn routes<T, S>(router: Router<Db<S>>) -> Router<Db<S>>
where
  T: Record,
  S: DocumentStore + 'static,
{
  let base = format!("/{}", T::COLLECTION);
  router
    .route(&base, get(list::<T, S>).post(create::<T, S>))
    .route(&format!("{base}/events"), get(events::<T, S>))
    .route(
      &format!("{base}/{{id}}"),
      get(get_one::<T, S>)
        .patch(update::<T, S>)
        .delete(remove::<T, S>),
    )
}

/// Record `id` if the caller owns it. Anything else is reported as not found.
pub(crate) async fn owned<T, S>(
  collection: &Collection<T, S>,
  id: Uuid,
  identity: &Identity,
) -> Result<Stored<T>, ApiError>
where
  T: Record,
  S: DocumentStore + 'static,
{
  collection
    .get(id)
    .await?
    .filter(|r| r.user_id == identity.user_id)
    .ok_or_else(|| ApiError::record_not_found(T::COLLECTION, id))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /{c}`
pub async fn list<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Stored<T>>>, ApiError>
where
  T: Record,
  S: DocumentStore + 'static,
{
  Ok(Json(db.collection::<T>().list(&identity.user_id).await?))
}

/// `GET /{c}/:id`
pub async fn get_one<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path(id): Path<Uuid>,
) -> Result<Json<Stored<T>>, ApiError>
where
  T: Record,
  S: DocumentStore + 'static,
{
  Ok(Json(owned(&db.collection::<T>(), id, &identity).await?))
}

// ─── Write ───────────────────────────────────────────────────────────────────

/// `POST /{c}`
pub async fn create<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Json(record): Json<T>,
) -> Result<impl IntoResponse, ApiError>
where
  T: Record,
  S: DocumentStore + 'static,
{
  let stored = db.collection::<T>().add(record, &identity.user_id).await?;
  Ok((StatusCode::CREATED, Json(stored)))
}

/// `PATCH /{c}/:id`
pub async fn update<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path(id): Path<Uuid>,
  Json(patch): Json<T::Patch>,
) -> Result<Json<Stored<T>>, ApiError>
where
  T: Record,
  S: DocumentStore + 'static,
{
  let collection = db.collection::<T>();
  owned(&collection, id, &identity).await?;
  Ok(Json(collection.update(id, patch).await?))
}

/// `DELETE /{c}/:id`
pub async fn remove<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  T: Record,
  S: DocumentStore + 'static,
{
  let collection = db.collection::<T>();
  match collection.get(id).await {
    Ok(None) => return Ok(StatusCode::NO_CONTENT),
    Ok(Some(r)) if r.user_id == identity.user_id => {}
    Ok(Some(_)) => return Err(ApiError::record_not_found(T::COLLECTION, id)),
    Err(e) => return Err(e.into()),
  }
  collection.delete(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Live query ──────────────────────────────────────────────────────────────

/// `GET /{c}/events`
///
/// Streams the caller's full record set as a `snapshot` event, then again
/// after every change. The subscription is cancelled when the client goes
/// away and the stream is dropped.
pub async fn events<T, S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
  T: Record,
  S: DocumentStore + 'static,
{
  debug!(collection = T::COLLECTION, user = %identity.user_id, "event stream opened");
  let feed = db.collection::<T>().subscribe(identity.user_id);

  let events = stream::unfold(feed, |mut feed| async move {
    loop {
      let snapshot = feed.next().await?;
      match Event::default().event("snapshot").json_data(&snapshot.records) {
        Ok(event) => return Some((Ok(event), feed)),
        Err(e) => warn!(collection = T::COLLECTION, error = %e, "cannot encode snapshot"),
      }
    }
  });

  Sse::new(events).keep_alive(KeepAlive::default())
}
