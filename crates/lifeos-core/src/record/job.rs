//! Job applications.

use serde::{Deserialize, Serialize};

use super::{Priority, Record, lenient};

/// Pipeline stage of a job application, in the order the board shows them.
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
pub enum JobStatus {
  #[default]
  #[serde(rename = "Found Link")]
  #[strum(serialize = "Found Link")]
  FoundLink,
  Applied,
  #[serde(rename = "HR/Lead Research")]
  #[strum(serialize = "HR/Lead Research")]
  LeadResearch,
  #[serde(rename = "Contact Request Sent")]
  #[strum(serialize = "Contact Request Sent")]
  ContactRequestSent,
  #[serde(rename = "Message Sent")]
  #[strum(serialize = "Message Sent")]
  MessageSent,
  Assessment,
  Result,
  Rejected,
}

impl JobStatus {
  /// No further progress is expected.
  pub fn is_closed(self) -> bool { matches!(self, Self::Result | Self::Rejected) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobApplication {
  pub company:         String,
  pub position:        String,
  #[serde(deserialize_with = "lenient::text")]
  pub link:            Option<String>,
  pub status:          JobStatus,
  pub priority:        Priority,
  #[serde(deserialize_with = "lenient::text")]
  pub hr_contact_name: Option<String>,
  #[serde(deserialize_with = "lenient::text")]
  pub hr_contact_link: Option<String>,
  #[serde(deserialize_with = "lenient::text")]
  pub notes:           Option<String>,
}

impl Default for JobApplication {
  fn default() -> Self {
    Self {
      company:         "Unknown Company".to_owned(),
      position:        "Unknown Role".to_owned(),
      link:            None,
      status:          JobStatus::default(),
      priority:        Priority::default(),
      hr_contact_name: None,
      hr_contact_link: None,
      notes:           None,
    }
  }
}

impl Record for JobApplication {
  const COLLECTION: &'static str = "jobs";

  type Patch = JobPatch;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub company:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub position:        Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub link:            Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:          Option<JobStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority:        Option<Priority>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub hr_contact_name: Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub hr_contact_link: Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub notes:           Option<Option<String>>,
}
