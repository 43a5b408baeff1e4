//! Master's-degree applications.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{
  Priority, Record,
  checklist::{self, Checklist, HasChecklist},
  lenient,
};
use crate::{Error, Result, store::Fields};

/// Checklist a new application starts with.
pub const DEFAULT_DOCUMENTS: &[(&str, bool)] =
  &[("CV", true), ("Transcript", true), ("Motivation Letter", true)];

const DEFAULT_PROBABILITY: u8 = 50;

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
pub enum MasterAppType {
  #[serde(rename = "Erasmus Mundus")]
  #[strum(serialize = "Erasmus Mundus")]
  ErasmusMundus,
  Scholarship,
  #[default]
  #[serde(rename = "Non-Scholarship")]
  #[strum(serialize = "Non-Scholarship")]
  NonScholarship,
}

/// Which English proficiency proof a programme accepts.
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
pub enum EnglishReq {
  #[serde(rename = "MOI Accepted")]
  #[strum(serialize = "MOI Accepted")]
  MoiAccepted,
  #[serde(rename = "IELTS Only")]
  #[strum(serialize = "IELTS Only")]
  IeltsOnly,
  #[serde(rename = "TOEFL")]
  #[strum(serialize = "TOEFL")]
  Toefl,
  #[default]
  #[serde(rename = "None")]
  #[strum(serialize = "None")]
  NotRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterApplication {
  pub university:          String,
  pub program:             String,
  pub location:            String,
  /// Overrides the country derived from `location` when set.
  #[serde(deserialize_with = "lenient::text")]
  pub country:             Option<String>,
  #[serde(rename = "type")]
  pub app_type:            MasterAppType,
  #[serde(deserialize_with = "lenient::date")]
  pub deadline:            Option<NaiveDate>,
  pub documents:           Checklist,
  pub english_req:         EnglishReq,
  /// Estimated chance of admission, in percent.
  #[serde(deserialize_with = "percent")]
  pub probability:         u8,
  #[serde(deserialize_with = "lenient::text")]
  pub professor_name:      Option<String>,
  #[serde(deserialize_with = "lenient::text")]
  pub professor_email:     Option<String>,
  pub professor_contacted: bool,
  pub contact_box_open:    bool,
  #[serde(deserialize_with = "lenient::text")]
  pub notes:               Option<String>,
  pub is_done:             bool,
  pub is_rejected:         bool,
  pub priority:            Priority,
}

impl Default for MasterApplication {
  fn default() -> Self {
    Self {
      university:          "Unknown Uni".to_owned(),
      program:             "Unknown Program".to_owned(),
      location:            String::new(),
      country:             None,
      app_type:            MasterAppType::default(),
      deadline:            None,
      documents:           Checklist::from_names(DEFAULT_DOCUMENTS),
      english_req:         EnglishReq::default(),
      probability:         DEFAULT_PROBABILITY,
      professor_name:      None,
      professor_email:     None,
      professor_contacted: false,
      contact_box_open:    false,
      notes:               None,
      is_done:             false,
      is_rejected:         false,
      priority:            Priority::default(),
    }
  }
}

/// Reads any JSON number (or null) and clamps it into `0..=100`.
fn percent<'de, D>(d: D) -> Result<u8, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Option::<f64>::deserialize(d)?;
  Ok(match raw {
    Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
    _ => DEFAULT_PROBABILITY,
  })
}

impl MasterApplication {
  pub fn new(university: impl Into<String>, program: impl Into<String>) -> Self {
    Self {
      university: university.into(),
      program: program.into(),
      ..Self::default()
    }
  }
}

fn check_probability(p: u8) -> Result<()> {
  if p > 100 {
    return Err(Error::Invalid(format!("probability out of range: {p}")));
  }
  Ok(())
}

impl Record for MasterApplication {
  const COLLECTION: &'static str = "masters";
  const SCHEMA_VERSION: u32 = 2;

  type Patch = MasterPatch;

  fn upgrade(id: Uuid, _from_version: u32, fields: &mut Fields) -> bool {
    checklist::repair(id, fields, DEFAULT_DOCUMENTS)
  }

  fn validate(&self) -> Result<()> { check_probability(self.probability) }

  fn validate_patch(patch: &MasterPatch) -> Result<()> {
    patch.probability.map_or(Ok(()), check_probability)
  }
}

impl HasChecklist for MasterApplication {
  fn checklist(&self) -> &Checklist { &self.documents }

  fn checklist_patch(checklist: Checklist) -> MasterPatch {
    MasterPatch { documents: Some(checklist), ..MasterPatch::default() }
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub university:          Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub program:             Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location:            Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub country:             Option<Option<String>>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub app_type:            Option<MasterAppType>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub deadline:            Option<Option<NaiveDate>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub documents:           Option<Checklist>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub english_req:         Option<EnglishReq>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub probability:         Option<u8>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub professor_name:      Option<Option<String>>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub professor_email:     Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub professor_contacted: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub contact_box_open:    Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub notes:               Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_done:             Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_rejected:         Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority:            Option<Priority>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn defaults_follow_the_application_form() {
    let app: MasterApplication = serde_json::from_value(json!({})).unwrap();
    assert_eq!(app.university, "Unknown Uni");
    assert_eq!(app.app_type, MasterAppType::NonScholarship);
    assert_eq!(app.english_req, EnglishReq::NotRequired);
    assert_eq!(app.probability, 50);
    let names: Vec<&str> =
      app.documents.items().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["CV", "Transcript", "Motivation Letter"]);
  }

  #[test]
  fn probability_is_clamped() {
    let high: MasterApplication =
      serde_json::from_value(json!({ "probability": 250 })).unwrap();
    let low: MasterApplication =
      serde_json::from_value(json!({ "probability": -3 })).unwrap();
    let null: MasterApplication =
      serde_json::from_value(json!({ "probability": null })).unwrap();
    assert_eq!(high.probability, 100);
    assert_eq!(low.probability, 0);
    assert_eq!(null.probability, 50);
  }

  #[test]
  fn type_field_keeps_its_wire_name() {
    let app = MasterApplication {
      app_type: MasterAppType::ErasmusMundus,
      ..MasterApplication::new("KU Leuven", "AI")
    };
    let json = serde_json::to_value(&app).unwrap();
    assert_eq!(json["type"], "Erasmus Mundus");
    assert!(json.get("appType").is_none());
  }

  #[test]
  fn patch_rejects_out_of_range_probability() {
    let patch = MasterPatch { probability: Some(101), ..MasterPatch::default() };
    assert!(MasterApplication::validate_patch(&patch).is_err());
  }

  #[test]
  fn upgrade_repairs_checklist() {
    let mut fields = match json!({ "documents": [{ "name": "CV", "isReady": true }] }) {
      serde_json::Value::Object(map) => map,
      _ => unreachable!(),
    };
    assert!(MasterApplication::upgrade(Uuid::new_v4(), 1, &mut fields));
    let app: MasterApplication =
      serde_json::from_value(serde_json::Value::Object(fields)).unwrap();
    assert!(app.documents.items()[0].is_completed);
  }
}
