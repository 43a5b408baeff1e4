//! Scholarship programmes and the universities they are linked to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
  Priority, Record,
  checklist::{self, Checklist, HasChecklist},
  lenient,
};
use crate::{Error, Result, store::Fields};

/// Checklist a new programme starts with.
pub const DEFAULT_DOCUMENTS: &[(&str, bool)] = &[
  ("CV", true),
  ("Research Proposal", true),
  ("Motivation Letter", true),
  ("Reference Letters (2-3)", true),
  ("Language Certificate", false),
  ("Academic Transcripts", true),
];

/// Where an application to a linked university stands.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScholarshipStatus {
  #[default]
  NotApplied,
  Applied,
  Accepted,
  Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkedUniversity {
  pub university_name: String,
  pub location:        String,
  pub status:          ScholarshipStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScholarshipProgram {
  pub name:                String,
  /// Free-form programme kind, e.g. "Government" or "University".
  #[serde(rename = "type")]
  pub kind:                String,
  #[serde(deserialize_with = "lenient::text")]
  pub description:         Option<String>,
  #[serde(deserialize_with = "lenient::date")]
  pub deadline:            Option<NaiveDate>,
  #[serde(deserialize_with = "lenient::text")]
  pub funding_amount:      Option<String>,
  #[serde(deserialize_with = "lenient::text")]
  pub notes:               Option<String>,
  pub linked_universities: Vec<LinkedUniversity>,
  pub documents:           Checklist,
  pub priority:            Priority,
}

impl Default for ScholarshipProgram {
  fn default() -> Self {
    Self {
      name:                String::new(),
      kind:                String::new(),
      description:         None,
      deadline:            None,
      funding_amount:      None,
      notes:               None,
      linked_universities: Vec::new(),
      documents:           Checklist::from_names(DEFAULT_DOCUMENTS),
      priority:            Priority::default(),
    }
  }
}

impl ScholarshipProgram {
  pub fn named(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  /// The link to `university`, matched by exact name.
  pub fn link_to(&self, university: &str) -> Option<&LinkedUniversity> {
    self
      .linked_universities
      .iter()
      .find(|u| u.university_name == university)
  }
}

fn require_name(name: &str) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Invalid("scholarship name must not be blank".into()));
  }
  Ok(())
}

impl Record for ScholarshipProgram {
  const COLLECTION: &'static str = "scholarships";
  const SCHEMA_VERSION: u32 = 2;

  type Patch = ScholarshipPatch;

  fn upgrade(id: Uuid, _from_version: u32, fields: &mut Fields) -> bool {
    checklist::repair(id, fields, DEFAULT_DOCUMENTS)
  }

  fn validate(&self) -> Result<()> { require_name(&self.name) }

  fn validate_patch(patch: &ScholarshipPatch) -> Result<()> {
    patch.name.as_deref().map_or(Ok(()), require_name)
  }
}

impl HasChecklist for ScholarshipProgram {
  fn checklist(&self) -> &Checklist { &self.documents }

  fn checklist_patch(checklist: Checklist) -> ScholarshipPatch {
    ScholarshipPatch { documents: Some(checklist), ..ScholarshipPatch::default() }
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScholarshipPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name:                Option<String>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind:                Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub description:         Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub deadline:            Option<Option<NaiveDate>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub funding_amount:      Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub notes:               Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub linked_universities: Option<Vec<LinkedUniversity>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub documents:           Option<Checklist>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority:            Option<Priority>,
}
