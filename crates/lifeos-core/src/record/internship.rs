//! Erasmus internship applications.

use serde::{Deserialize, Serialize};

use super::{Priority, Record, lenient};

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
pub enum ErasmusStatus {
  #[default]
  Applied,
  Waiting,
  Accepted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErasmusInternship {
  pub company:        String,
  pub role:           String,
  pub location:       String,
  #[serde(deserialize_with = "lenient::text")]
  pub contact_person: Option<String>,
  #[serde(deserialize_with = "lenient::text")]
  pub contact_notes:  Option<String>,
  pub status:         ErasmusStatus,
  pub visa_required:  bool,
  /// Free text, e.g. "€750/month".
  #[serde(deserialize_with = "lenient::text")]
  pub grant_amount:   Option<String>,
  pub priority:       Priority,
}

impl Default for ErasmusInternship {
  fn default() -> Self {
    Self {
      company:        "Unknown".to_owned(),
      role:           "Intern".to_owned(),
      location:       String::new(),
      contact_person: None,
      contact_notes:  None,
      status:         ErasmusStatus::default(),
      visa_required:  false,
      grant_amount:   None,
      priority:       Priority::default(),
    }
  }
}

impl Record for ErasmusInternship {
  const COLLECTION: &'static str = "erasmus";

  type Patch = InternshipPatch;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternshipPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub company:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role:           Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location:       Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub contact_person: Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub contact_notes:  Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:         Option<ErasmusStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub visa_required:  Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub grant_amount:   Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority:       Option<Priority>,
}
