use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Tree level of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Project,
    Task,
    ChildTask,
}

impl Level {
    /// Noun used in user-facing messages ("2 tasks deleted")
    pub fn noun(self, count: usize) -> &'static str {
        match (self, count == 1) {
            (Level::Project, true) => "project",
            (Level::Project, false) => "projects",
            (Level::Task, true) => "task",
            (Level::Task, false) => "tasks",
            (Level::ChildTask, true) => "child task",
            (Level::ChildTask, false) => "child tasks",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Project => write!(f, "project"),
            Level::Task => write!(f, "task"),
            Level::ChildTask => write!(f, "child-task"),
        }
    }
}

/// Work category of a task; drives the reference-number segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Design,
    Development,
    Testing,
    Review,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Design,
        Category::Development,
        Category::Testing,
        Category::Review,
    ];

    /// The segment used inside reference numbers
    pub fn code(self) -> &'static str {
        match self {
            Category::Design => "DES",
            Category::Development => "DEV",
            Category::Testing => "TST",
            Category::Review => "REV",
        }
    }

    pub fn from_code(code: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Parse a user-supplied category name (case-insensitive, code or full name)
    pub fn parse(s: &str) -> Option<Category> {
        let s = s.trim();
        Category::ALL.into_iter().find(|c| {
            c.code().eq_ignore_ascii_case(s) || c.to_string().eq_ignore_ascii_case(s)
        })
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Design => write!(f, "Design"),
            Category::Development => write!(f, "Development"),
            Category::Testing => write!(f, "Testing"),
            Category::Review => write!(f, "Review"),
        }
    }
}

/// Project status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Cancelled,
    OnHold,
}

impl ProjectStatus {
    pub fn parse(s: &str) -> Option<ProjectStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ProjectStatus::Pending),
            "in-progress" | "in_progress" | "inprogress" => Some(ProjectStatus::InProgress),
            "done" => Some(ProjectStatus::Done),
            "cancelled" | "canceled" => Some(ProjectStatus::Cancelled),
            "on-hold" | "on_hold" | "onhold" => Some(ProjectStatus::OnHold),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in-progress",
            ProjectStatus::Done => "done",
            ProjectStatus::Cancelled => "cancelled",
            ProjectStatus::OnHold => "on-hold",
        };
        f.write_str(s)
    }
}

/// Task and child-task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Done,
    Working,
    Stuck,
    #[default]
    NotStarted,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "done" => Some(TaskStatus::Done),
            "working" => Some(TaskStatus::Working),
            "stuck" => Some(TaskStatus::Stuck),
            "not-started" | "not_started" | "notstarted" | "todo" => Some(TaskStatus::NotStarted),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Done => "done",
            TaskStatus::Working => "working",
            TaskStatus::Stuck => "stuck",
            TaskStatus::NotStarted => "not-started",
        };
        f.write_str(s)
    }
}

/// Start/end date pair. Either end may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl Timeline {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Timeline { start, end }
    }

    /// Inclusive day count, when both ends are present and ordered
    pub fn span_days(&self) -> Option<u32> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end >= start => {
                u32::try_from((end - start).num_days() + 1).ok()
            }
            _ => None,
        }
    }
}

/// Fields shared by all three tree levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityBase {
    /// Opaque id, time-derived at creation
    pub id: String,
    #[serde(default)]
    pub reference_number: String,
    pub name: String,
    #[serde(default)]
    pub timeline: Timeline,
    #[serde(default)]
    pub plan_days: u32,
    /// Comma-separated ids of entities this one waits on
    #[serde(default)]
    pub predecessors: String,
    #[serde(default, rename = "is_deleted")]
    pub is_deleted: bool,
    #[serde(default, rename = "deleted_at")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EntityBase {
    pub fn new(id: String, name: String) -> Self {
        EntityBase {
            id,
            reference_number: String::new(),
            name,
            timeline: Timeline::default(),
            plan_days: 0,
            predecessors: String::new(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Parsed predecessor ids, trimmed, empty entries skipped
    pub fn predecessor_ids(&self) -> Vec<&str> {
        parse_predecessors(&self.predecessors)
    }

    /// Apply the plan-days invariant: derive from the timeline when both dates are valid
    pub fn sync_plan_days(&mut self) {
        if let Some(days) = self.timeline.span_days() {
            self.plan_days = days;
        }
    }

    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
    }

    pub fn clear_deleted(&mut self) {
        self.is_deleted = false;
        self.deleted_at = None;
    }
}

/// Split a comma-joined predecessor list
pub fn parse_predecessors(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Generate a fresh opaque entity id
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn span_days_is_inclusive() {
        let t = Timeline::new(Some(date("2024-01-01")), Some(date("2024-01-05")));
        assert_eq!(t.span_days(), Some(5));
    }

    #[test]
    fn span_days_none_when_reversed_or_open() {
        let reversed = Timeline::new(Some(date("2024-01-05")), Some(date("2024-01-01")));
        assert_eq!(reversed.span_days(), None);
        let open = Timeline::new(Some(date("2024-01-05")), None);
        assert_eq!(open.span_days(), None);
    }

    #[test]
    fn sync_plan_days_keeps_manual_value_without_dates() {
        let mut base = EntityBase::new("a".into(), "A".into());
        base.plan_days = 7;
        base.sync_plan_days();
        assert_eq!(base.plan_days, 7);

        base.timeline = Timeline::new(Some(date("2024-03-01")), Some(date("2024-03-03")));
        base.sync_plan_days();
        assert_eq!(base.plan_days, 3);
    }

    #[test]
    fn predecessor_parsing_skips_blanks() {
        assert_eq!(parse_predecessors(" a, ,b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_predecessors("").is_empty());
    }

    #[test]
    fn category_parse_accepts_code_and_name() {
        assert_eq!(Category::parse("dev"), Some(Category::Development));
        assert_eq!(Category::parse("Testing"), Some(Category::Testing));
        assert_eq!(Category::parse("qa"), None);
        assert_eq!(Category::from_code("REV"), Some(Category::Review));
    }

    #[test]
    fn base_serializes_with_document_field_names() {
        let mut base = EntityBase::new("a".into(), "A".into());
        base.reference_number = "PRJ-1".into();
        let json = serde_json::to_value(&base).unwrap();
        assert!(json.get("referenceNumber").is_some());
        assert!(json.get("planDays").is_some());
        assert_eq!(json["is_deleted"], serde_json::Value::Bool(false));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
