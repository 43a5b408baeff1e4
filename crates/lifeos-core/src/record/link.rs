//! Bookmarked links, grouped by category.

use serde::{Deserialize, Serialize};

use super::{Record, lenient};
use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
  strum::EnumString,
)]
pub enum LinkCategory {
  #[serde(rename = "Data Science")]
  #[strum(serialize = "Data Science")]
  DataScience,
  #[serde(rename = "AI")]
  #[strum(serialize = "AI")]
  Ai,
  Frontend,
  Backend,
  #[serde(rename = "AI Services")]
  #[strum(serialize = "AI Services")]
  AiServices,
  Tools,
  Learning,
  #[default]
  Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsefulLink {
  pub title:       String,
  pub url:         String,
  pub category:    LinkCategory,
  #[serde(deserialize_with = "lenient::text")]
  pub description: Option<String>,
}

impl UsefulLink {
  pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
    Self { title: title.into(), url: url.into(), ..Self::default() }
  }
}

fn require(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::Invalid(format!("{field} must not be blank")));
  }
  Ok(())
}

impl Record for UsefulLink {
  const COLLECTION: &'static str = "links";

  type Patch = LinkPatch;

  fn validate(&self) -> Result<()> {
    require("title", &self.title)?;
    require("url", &self.url)
  }

  fn validate_patch(patch: &LinkPatch) -> Result<()> {
    if let Some(title) = &patch.title {
      require("title", title)?;
    }
    if let Some(url) = &patch.url {
      require("url", url)?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:       Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category:    Option<LinkCategory>,
  #[serde(
    skip_serializing_if = "Option::is_none",
    deserialize_with = "lenient::nullable"
  )]
  pub description: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn blank_title_or_url_is_invalid() {
    assert!(UsefulLink::new("Docs", "https://docs.rs").validate().is_ok());
    assert!(UsefulLink::new(" ", "https://docs.rs").validate().is_err());
    assert!(UsefulLink::new("Docs", "").validate().is_err());

    let patch = LinkPatch { url: Some("  ".into()), ..LinkPatch::default() };
    assert!(UsefulLink::validate_patch(&patch).is_err());
  }

  #[test]
  fn category_labels_parse_back() {
    assert_eq!(LinkCategory::AiServices.to_string(), "AI Services");
    assert_eq!(LinkCategory::from_str("Data Science").unwrap(), LinkCategory::DataScience);
    assert!(LinkCategory::from_str("Cooking").is_err());
  }
}
