//! Tasks: the daily list, the backlog and recurring chores.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Priority, Record, lenient};
use crate::{Error, Result, store::Fields};

/// How a recurring task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringType {
  Daily,
  /// On the weekdays listed in [`Task::recurring_days`].
  Weekly,
  /// On the day of month in [`Task::recurring_date`].
  Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
  pub title:               String,
  #[serde(deserialize_with = "lenient::text")]
  pub description:         Option<String>,
  pub priority:            Priority,
  /// `true` puts the task on today's list, `false` in the backlog.
  pub is_daily:            bool,
  pub is_completed:        bool,
  #[serde(deserialize_with = "lenient::date")]
  pub due_date:            Option<NaiveDate>,
  /// Set when the task was moved off the daily list because it went overdue.
  pub overdue_from_daily:  bool,
  pub is_recurring:        bool,
  pub recurring_type:      Option<RecurringType>,
  /// Weekdays for [`RecurringType::Weekly`]; 0 = Sunday … 6 = Saturday.
  pub recurring_days:      Option<Vec<u8>>,
  /// Day of month (1-31) for [`RecurringType::Monthly`].
  pub recurring_date:      Option<u8>,
  #[serde(deserialize_with = "lenient::date")]
  pub last_completed_date: Option<NaiveDate>,
  /// Manual ordering within a list. Drag-and-drop may leave fractions.
  #[serde(deserialize_with = "lenient::number")]
  pub order:               Option<f64>,
}

impl Default for Task {
  fn default() -> Self {
    Self {
      title:               "New Task".to_owned(),
      description:         None,
      priority:            Priority::default(),
      is_daily:            false,
      is_completed:        false,
      due_date:            None,
      overdue_from_daily:  false,
      is_recurring:        false,
      recurring_type:      None,
      recurring_days:      None,
      recurring_date:      None,
      last_completed_date: None,
      order:               None,
    }
  }
}

impl Task {
  pub fn titled(title: impl Into<String>) -> Self {
    Self { title: title.into(), ..Self::default() }
  }

  /// Due strictly before `today` and still open.
  pub fn is_overdue(&self, today: NaiveDate) -> bool {
    !self.is_completed && self.due_date.is_some_and(|d| d < today)
  }

  /// Whether a recurring task falls on `date`. Non-recurring tasks never do.
  pub fn recurs_on(&self, date: NaiveDate) -> bool {
    if !self.is_recurring {
      return false;
    }
    match self.recurring_type {
      Some(RecurringType::Daily) => true,
      Some(RecurringType::Weekly) => {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self
          .recurring_days
          .as_deref()
          .is_some_and(|days| days.contains(&weekday))
      }
      Some(RecurringType::Monthly) => {
        self.recurring_date.is_some_and(|d| u32::from(d) == date.day())
      }
      None => false,
    }
  }
}

fn check_recurrence(days: Option<&[u8]>, date: Option<u8>) -> Result<()> {
  if let Some(bad) = days.and_then(|ds| ds.iter().find(|d| **d > 6)) {
    return Err(Error::Invalid(format!("weekday out of range: {bad}")));
  }
  if let Some(d) = date
    && !(1..=31).contains(&d)
  {
    return Err(Error::Invalid(format!("day of month out of range: {d}")));
  }
  Ok(())
}

impl Record for Task {
  const COLLECTION: &'static str = "tasks";
  const SCHEMA_VERSION: u32 = 2;

  type Patch = TaskPatch;

  /// v1 documents used `recurrenceType` / `recurrenceDays`, with a
  /// `weekdays` pattern that is now spelled `weekly`.
  fn upgrade(_id: Uuid, _from_version: u32, fields: &mut Fields) -> bool {
    let mut changed = false;

    for (old, new) in [
      ("recurrenceType", "recurringType"),
      ("recurrenceDays", "recurringDays"),
    ] {
      // A repaired document keeps the old key as `null`.
      if let Some(value) = fields.remove(old)
        && !value.is_null()
      {
        changed = true;
        if !fields.contains_key(new) {
          fields.insert(new.to_owned(), value);
        }
      }
    }

    let pattern = fields
      .get("recurringType")
      .and_then(Value::as_str)
      .map(str::to_owned);
    match pattern.as_deref() {
      Some("weekdays") => {
        fields.insert("recurringType".to_owned(), Value::from("weekly"));
        changed = true;
      }
      Some("daily" | "weekly" | "monthly") | None => {}
      Some(_) => {
        fields.insert("recurringType".to_owned(), Value::Null);
        changed = true;
      }
    }

    changed
  }

  fn validate(&self) -> Result<()> {
    check_recurrence(self.recurring_days.as_deref(), self.recurring_date)
  }

  fn validate_patch(patch: &TaskPatch) -> Result<()> {
    check_recurrence(
      patch.recurring_days.as_ref().and_then(|d| d.as_deref()),
      patch.recurring_date.flatten(),
    )
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// Partial update of a [`Task`]. Outer `None` leaves a field alone; for
/// optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:               Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub description:         Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority:            Option<Priority>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_daily:            Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_completed:        Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub due_date:            Option<Option<NaiveDate>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub overdue_from_daily:  Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_recurring:        Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub recurring_type:      Option<Option<RecurringType>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub recurring_days:      Option<Option<Vec<u8>>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub recurring_date:      Option<Option<u8>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub last_completed_date: Option<Option<NaiveDate>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub order:               Option<Option<f64>>,
}

impl TaskPatch {
  pub fn completed(done: bool) -> Self {
    Self { is_completed: Some(done), ..Self::default() }
  }
}
