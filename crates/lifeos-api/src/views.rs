//! Read-only derived views.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/tasks/view` | `?filter=daily\|backlog\|upcoming\|all`, optional `today` |
//! | `GET`  | `/agenda` | Next seven days of due tasks and deadlines |
//! | `GET`  | `/countries` | Master's applications grouped by country |
//! | `GET`  | `/countries/:country` | Universities in one country, with linked scholarships |
//! | `GET`  | `/links/by-category` | Optional `?category=` |

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use chrono::{Local, NaiveDate};
use lifeos_core::{
  Db,
  record::LinkCategory,
  session::Identity,
  store::DocumentStore,
  view::{self, TaskFilter},
};
use serde::Deserialize;

use crate::error::ApiError;

/// Reference date for views; the server's local date unless given.
#[derive(Debug, Default, Deserialize)]
pub struct DateParams {
  pub today: Option<NaiveDate>,
}

fn or_local_today(today: Option<NaiveDate>) -> NaiveDate {
  today.unwrap_or_else(|| Local::now().date_naive())
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TaskViewParams {
  #[serde(default)]
  pub filter: TaskFilter,
  pub today:  Option<NaiveDate>,
}

/// `GET /tasks/view[?filter=<filter>][&today=YYYY-MM-DD]`
pub async fn tasks<S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Query(params): Query<TaskViewParams>,
) -> Result<Response, ApiError>
where
  S: DocumentStore + 'static,
{
  let tasks = db.tasks().list(&identity.user_id).await?;
  let today = or_local_today(params.today);
  Ok(Json(view::filter_tasks(&tasks, params.filter, today)).into_response())
}

/// `GET /agenda[?today=YYYY-MM-DD]`
pub async fn agenda<S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Query(params): Query<DateParams>,
) -> Result<Response, ApiError>
where
  S: DocumentStore + 'static,
{
  let tasks = db.tasks().list(&identity.user_id).await?;
  let masters = db.masters().list(&identity.user_id).await?;
  Ok(Json(view::agenda(&tasks, &masters, or_local_today(params.today))).into_response())
}

// ─── Countries ───────────────────────────────────────────────────────────────

/// `GET /countries`
pub async fn countries<S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
) -> Result<Response, ApiError>
where
  S: DocumentStore + 'static,
{
  let masters = db.masters().list(&identity.user_id).await?;
  Ok(Json(view::group_by_country(&masters)).into_response())
}

/// `GET /countries/:country`
pub async fn country<S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Path(country): Path<String>,
) -> Result<Response, ApiError>
where
  S: DocumentStore + 'static,
{
  let masters = db.masters().list(&identity.user_id).await?;
  let scholarships = db.scholarships().list(&identity.user_id).await?;
  Ok(Json(view::universities_in(&country, &masters, &scholarships)).into_response())
}

// ─── Links ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LinkParams {
  pub category: Option<LinkCategory>,
}

/// `GET /links/by-category[?category=<category>]`
pub async fn links<S>(
  State(db): State<Db<S>>,
  Extension(identity): Extension<Identity>,
  Query(params): Query<LinkParams>,
) -> Result<Response, ApiError>
where
  S: DocumentStore + 'static,
{
  let links = db.links().list(&identity.user_id).await?;
  Ok(Json(view::links_by_category(&links, params.category)).into_response())
}
