use std::ops::Range;

use regex::Regex;
use serde::Serialize;

use crate::model::entity::Level;
use crate::model::project::Project;
use crate::model::tree;

/// Which field of an entity matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Id,
    Name,
    Reference,
    Predecessors,
}

/// A search hit for one field of one entity
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub project_id: String,
    pub entity_id: String,
    pub level: Level,
    pub field: MatchField,
    pub spans: Vec<Range<usize>>,
}

/// Collect all non-overlapping match byte-ranges for a regex in the given text.
fn find_matches(re: &Regex, text: &str) -> Vec<Range<usize>> {
    re.find_iter(text).map(|m| m.start()..m.end()).collect()
}

/// Search every live entity, in tree order.
///
/// If `project_filter` is `Some`, only that project (by id or reference
/// number) is searched.
pub fn search_board(projects: &[Project], re: &Regex, project_filter: Option<&str>) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for loc in tree::walk(projects) {
        if tree::is_hidden(projects, loc) {
            continue;
        }
        let project = &projects[loc.project];
        if let Some(filter) = project_filter
            && project.base.id != filter
            && project.base.reference_number != filter
        {
            continue;
        }
        let Some(entity) = tree::entity_at(projects, loc) else {
            continue;
        };
        let base = entity.base();
        let fields = [
            (MatchField::Id, base.id.as_str()),
            (MatchField::Name, base.name.as_str()),
            (MatchField::Reference, base.reference_number.as_str()),
            (MatchField::Predecessors, base.predecessors.as_str()),
        ];
        for (field, text) in fields {
            let spans = find_matches(re, text);
            if !spans.is_empty() {
                hits.push(SearchHit {
                    project_id: project.base.id.clone(),
                    entity_id: base.id.clone(),
                    level: entity.level(),
                    field,
                    spans,
                });
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::Category;
    use crate::model::task::Task;

    fn board() -> Vec<Project> {
        let mut p = Project::new("P1".into(), "PRJ-1".into(), "Website".into());
        let mut t = Task::new("T1".into(), "Design homepage".into(), Category::Design);
        t.base.reference_number = "PRJ-1.DES-01".into();
        p.subtasks.push(t);
        let mut gone = Task::new("T2".into(), "Design footer".into(), Category::Design);
        gone.base.is_deleted = true;
        p.subtasks.push(gone);
        let q = Project::new("P2".into(), "PRJ-2".into(), "Design system".into());
        vec![p, q]
    }

    #[test]
    fn test_search_names_skip_deleted() {
        let re = Regex::new("(?i)design").unwrap();
        let hits = search_board(&board(), &re, None);
        let ids: Vec<&str> = hits.iter().map(|h| h.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "P2"]);
        assert_eq!(hits[0].spans, vec![0..6]);
        assert_eq!(hits[0].level, Level::Task);
    }

    #[test]
    fn test_search_reference_numbers() {
        let re = Regex::new(r"DES-\d+").unwrap();
        let hits = search_board(&board(), &re, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].field, MatchField::Reference);
    }

    #[test]
    fn test_search_project_filter_by_reference() {
        let re = Regex::new("(?i)design").unwrap();
        let hits = search_board(&board(), &re, Some("PRJ-2"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].project_id, "P2");
    }

    #[test]
    fn test_search_multiple_spans() {
        let re = Regex::new("e").unwrap();
        let hits = search_board(&board(), &re, Some("P1"));
        let name_hit = hits
            .iter()
            .find(|h| h.entity_id == "P1" && h.field == MatchField::Name)
            .unwrap();
        assert_eq!(name_hit.spans, vec![1..2, 6..7]);
    }
}
