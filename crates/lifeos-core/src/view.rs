//! Derived views over snapshots: task lists, the weekly agenda, the
//! per-country breakdown of applications and grouped links.
//!
//! Everything here is a pure function of records and a reference date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::record::{
  LinkCategory, MasterApplication, ScholarshipProgram, ScholarshipStatus,
  Stored, Task, UsefulLink,
};

/// Days covered by [`agenda`], starting today.
pub const AGENDA_DAYS: usize = 7;

/// Country label for applications with no usable location.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

// ─── Tasks ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TaskFilter {
  /// Today's list.
  #[default]
  Daily,
  Backlog,
  /// Due after today.
  Upcoming,
  All,
}

impl TaskFilter {
  pub fn matches(self, task: &Task, today: NaiveDate) -> bool {
    match self {
      Self::Daily => task.is_daily,
      Self::Backlog => !task.is_daily,
      Self::Upcoming => task.due_date.is_some_and(|d| d > today),
      Self::All => true,
    }
  }
}

/// Tasks selected by `filter`, open ones first. `Upcoming` orders by due
/// date, everything else by priority; ties keep snapshot order.
pub fn filter_tasks(
  tasks: &[Stored<Task>],
  filter: TaskFilter,
  today: NaiveDate,
) -> Vec<&Stored<Task>> {
  let mut selected: Vec<_> = tasks
    .iter()
    .filter(|t| filter.matches(&t.record, today))
    .collect();
  selected.sort_by(|a, b| {
    let (a, b) = (&a.record, &b.record);
    a.is_completed.cmp(&b.is_completed).then_with(|| {
      match (filter, a.due_date, b.due_date) {
        (TaskFilter::Upcoming, Some(x), Some(y)) => x.cmp(&y),
        _ => a.priority.cmp(&b.priority),
      }
    })
  });
  selected
}

// ─── Agenda ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaDay<'a> {
  pub date:      NaiveDate,
  /// Open tasks due this day.
  pub tasks:     Vec<&'a Stored<Task>>,
  /// Applications whose deadline is this day.
  pub deadlines: Vec<&'a Stored<MasterApplication>>,
}

/// The next [`AGENDA_DAYS`] days starting with `today`.
pub fn agenda<'a>(
  tasks: &'a [Stored<Task>],
  masters: &'a [Stored<MasterApplication>],
  today: NaiveDate,
) -> Vec<AgendaDay<'a>> {
  std::iter::successors(Some(today), |d| d.succ_opt())
    .take(AGENDA_DAYS)
    .map(|date| AgendaDay {
      date,
      tasks: tasks
        .iter()
        .filter(|t| !t.record.is_completed && t.record.due_date == Some(date))
        .collect(),
      deadlines: masters
        .iter()
        .filter(|m| m.record.deadline == Some(date))
        .collect(),
    })
    .collect()
}

// ─── Countries ───────────────────────────────────────────────────────────────

/// Explicit country if set, else the last comma-separated part of the
/// location ("Milan, Italy" → "Italy").
pub fn country_of(app: &MasterApplication) -> String {
  if let Some(country) = &app.country {
    return country.trim().to_owned();
  }
  app
    .location
    .rsplit(',')
    .next()
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .unwrap_or(UNKNOWN_COUNTRY)
    .to_owned()
}

/// How a master's application ended up, in scholarship terms.
pub fn application_status(app: &MasterApplication) -> ScholarshipStatus {
  match (app.is_done, app.is_rejected) {
    (true, true) => ScholarshipStatus::Rejected,
    (true, false) => ScholarshipStatus::Accepted,
    (false, _) => ScholarshipStatus::Applied,
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryGroup<'a> {
  pub country:           String,
  /// Distinct university names.
  pub university_count:  usize,
  pub application_count: usize,
  pub applications:      Vec<&'a Stored<MasterApplication>>,
}

/// Applications grouped by [`country_of`], largest group first. Equal-sized
/// groups keep the order in which their country first appears.
pub fn group_by_country(masters: &[Stored<MasterApplication>]) -> Vec<CountryGroup<'_>> {
  let mut groups: Vec<CountryGroup<'_>> = Vec::new();
  for app in masters {
    let country = country_of(&app.record);
    match groups.iter_mut().find(|g| g.country == country) {
      Some(group) => group.applications.push(app),
      None => groups.push(CountryGroup {
        country,
        university_count: 0,
        application_count: 0,
        applications: vec![app],
      }),
    }
  }
  for group in &mut groups {
    let mut names: Vec<&str> = group
      .applications
      .iter()
      .map(|a| a.record.university.as_str())
      .collect();
    names.sort_unstable();
    names.dedup();
    group.university_count = names.len();
    group.application_count = group.applications.len();
  }
  groups.sort_by(|a, b| b.application_count.cmp(&a.application_count));
  groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityGroup<'a> {
  pub university_name: String,
  /// Location of the first application to this university.
  pub location:        String,
  pub applications:    Vec<&'a Stored<MasterApplication>>,
  /// Programmes that list this university among their linked universities.
  pub scholarships:    Vec<&'a Stored<ScholarshipProgram>>,
}

/// Applications in `country`, grouped by university, each with the
/// scholarship programmes linked to it.
pub fn universities_in<'a>(
  country: &str,
  masters: &'a [Stored<MasterApplication>],
  scholarships: &'a [Stored<ScholarshipProgram>],
) -> Vec<UniversityGroup<'a>> {
  let mut groups: Vec<UniversityGroup<'a>> = Vec::new();
  for app in masters.iter().filter(|a| country_of(&a.record) == country) {
    match groups
      .iter_mut()
      .find(|g| g.university_name == app.record.university)
    {
      Some(group) => group.applications.push(app),
      None => groups.push(UniversityGroup {
        university_name: app.record.university.clone(),
        location:        app.record.location.clone(),
        applications:    vec![app],
        scholarships:    Vec::new(),
      }),
    }
  }
  for group in &mut groups {
    group.scholarships = scholarships
      .iter()
      .filter(|s| s.record.link_to(&group.university_name).is_some())
      .collect();
  }
  groups
}

// ─── Links ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkGroup<'a> {
  pub category: LinkCategory,
  pub links:    Vec<&'a Stored<UsefulLink>>,
}

/// Links grouped by category in category order, empty groups omitted. With
/// `only`, just that category.
pub fn links_by_category(
  links: &[Stored<UsefulLink>],
  only: Option<LinkCategory>,
) -> Vec<LinkGroup<'_>> {
  LinkCategory::iter()
    .filter(|c| only.is_none_or(|o| o == *c))
    .map(|category| LinkGroup {
      category,
      links: links.iter().filter(|l| l.record.category == category).collect(),
    })
    .filter(|g| !g.links.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::record::{LinkedUniversity, Priority, UserId};

  fn stored<T>(record: T) -> Stored<T> {
    Stored {
      id: Uuid::new_v4(),
      user_id: UserId::from("u1"),
      created_at: DateTime::<Utc>::UNIX_EPOCH,
      updated_at: DateTime::<Utc>::UNIX_EPOCH,
      record,
    }
  }

  fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, d).unwrap() }

  fn master(uni: &str, location: &str) -> Stored<MasterApplication> {
    stored(MasterApplication {
      location: location.into(),
      ..MasterApplication::new(uni, "MSc")
    })
  }

  #[test]
  fn daily_view_puts_completed_last_then_priority() {
    let tasks = vec![
      stored(Task { is_daily: true, is_completed: true, priority: Priority::High, ..Task::titled("done") }),
      stored(Task { is_daily: true, priority: Priority::Low, ..Task::titled("low") }),
      stored(Task { is_daily: true, priority: Priority::High, ..Task::titled("high") }),
      stored(Task::titled("backlog")),
    ];
    let titles: Vec<_> = filter_tasks(&tasks, TaskFilter::Daily, day(10))
      .iter()
      .map(|t| t.record.title.as_str())
      .collect();
    assert_eq!(titles, ["high", "low", "done"]);
  }

  #[test]
  fn upcoming_is_strictly_future_by_due_date() {
    let tasks = vec![
      stored(Task { due_date: Some(day(20)), ..Task::titled("later") }),
      stored(Task { due_date: Some(day(10)), ..Task::titled("today") }),
      stored(Task { due_date: Some(day(12)), ..Task::titled("soon") }),
    ];
    let titles: Vec<_> = filter_tasks(&tasks, TaskFilter::Upcoming, day(10))
      .iter()
      .map(|t| t.record.title.as_str())
      .collect();
    assert_eq!(titles, ["soon", "later"]);
  }

  #[test]
  fn filter_parses_from_query_strings() {
    assert_eq!("Upcoming".parse::<TaskFilter>().unwrap(), TaskFilter::Upcoming);
    assert!("weekly".parse::<TaskFilter>().is_err());
  }

  #[test]
  fn agenda_covers_a_week() {
    let tasks = vec![
      stored(Task { due_date: Some(day(11)), ..Task::titled("open") }),
      stored(Task { due_date: Some(day(11)), is_completed: true, ..Task::titled("closed") }),
      stored(Task { due_date: Some(day(30)), ..Task::titled("far") }),
    ];
    let masters = vec![stored(MasterApplication {
      deadline: Some(day(16)),
      ..MasterApplication::new("TU Munich", "Informatics")
    })];
    let week = agenda(&tasks, &masters, day(10));
    assert_eq!(week.len(), AGENDA_DAYS);
    assert_eq!(week[1].tasks.len(), 1);
    assert_eq!(week[1].tasks[0].record.title, "open");
    assert_eq!(week[6].deadlines.len(), 1);
    assert!(week.iter().all(|d| d.tasks.iter().all(|t| t.record.title != "far")));
  }

  #[test]
  fn countries_group_by_location_suffix() {
    let masters = vec![
      master("Politecnico di Milano", "Milan, Italy"),
      master("TU Delft", "Delft, Netherlands"),
      master("Sapienza", "Rome, Italy"),
      master("Sapienza", "Rome, Italy"),
      master("Somewhere", "  "),
      stored(MasterApplication {
        country: Some("Germany".into()),
        ..MasterApplication::new("TUM", "Munich")
      }),
    ];
    let groups = group_by_country(&masters);
    assert_eq!(groups[0].country, "Italy");
    assert_eq!(groups[0].application_count, 3);
    assert_eq!(groups[0].university_count, 2);
    let names: Vec<_> = groups.iter().map(|g| g.country.as_str()).collect();
    assert_eq!(names, ["Italy", "Netherlands", "Unknown", "Germany"]);
  }

  #[test]
  fn universities_pick_up_linked_scholarships() {
    let masters = vec![
      master("TU Delft", "Delft, Netherlands"),
      master("Politecnico di Milano", "Milan, Italy"),
    ];
    let scholarships = vec![
      stored(ScholarshipProgram {
        linked_universities: vec![LinkedUniversity {
          university_name: "TU Delft".into(),
          ..LinkedUniversity::default()
        }],
        ..ScholarshipProgram::named("Holland Scholarship")
      }),
      stored(ScholarshipProgram::named("Unlinked")),
    ];
    let unis = universities_in("Netherlands", &masters, &scholarships);
    assert_eq!(unis.len(), 1);
    assert_eq!(unis[0].scholarships.len(), 1);
    assert_eq!(unis[0].scholarships[0].record.name, "Holland Scholarship");
  }

  #[test]
  fn status_from_done_and_rejected() {
    let mut app = MasterApplication::default();
    assert_eq!(application_status(&app), ScholarshipStatus::Applied);
    app.is_done = true;
    assert_eq!(application_status(&app), ScholarshipStatus::Accepted);
    app.is_rejected = true;
    assert_eq!(application_status(&app), ScholarshipStatus::Rejected);
  }

  #[test]
  fn links_grouped_in_category_order() {
    let links = vec![
      stored(UsefulLink { category: LinkCategory::Tools, ..UsefulLink::new("jq", "https://jqlang.org") }),
      stored(UsefulLink { category: LinkCategory::Ai, ..UsefulLink::new("HF", "https://huggingface.co") }),
      stored(UsefulLink::new("misc", "https://example.com")),
    ];
    let all = links_by_category(&links, None);
    let cats: Vec<_> = all.iter().map(|g| g.category).collect();
    assert_eq!(cats, [LinkCategory::Ai, LinkCategory::Tools, LinkCategory::Other]);

    let tools = links_by_category(&links, Some(LinkCategory::Tools));
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].links[0].record.title, "jq");
  }
}
