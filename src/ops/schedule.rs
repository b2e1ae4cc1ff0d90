//! Dependency-driven timeline propagation.
//!
//! One pass visits every live entity exactly once. Predecessors are visited
//! before their dependents (depth-first over the predecessor graph, ties in
//! tree-walk order), so on an acyclic graph a single pass reaches the fixed
//! point and a second pass changes nothing. Entities on a predecessor cycle
//! keep the dates they had and are listed in the report; their dependents
//! are scheduled from those stale dates, so repeated passes stay put.

use chrono::{Days, NaiveDate};
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::entity::Level;
use crate::model::project::Project;
use crate::model::tree::{self, Locator};

/// A predecessor id that contributed no end date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPredecessor {
    pub entity_id: String,
    pub predecessor: String,
}

/// What a scheduling pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    /// Entities whose timeline or plan-days changed
    pub updated: usize,
    pub unresolved: Vec<UnresolvedPredecessor>,
    /// Entities on a predecessor cycle, left unscheduled
    pub cyclic: Vec<String>,
}

/// Pure form: returns the rescheduled tree, leaving the input untouched.
pub fn reschedule(projects: &[Project], project_start: NaiveDate) -> Vec<Project> {
    let mut out = projects.to_vec();
    reschedule_in_place(&mut out, project_start);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Live entities in walk order with their resolved predecessor edges
struct Graph {
    nodes: Vec<Locator>,
    edges: Vec<Vec<usize>>,
    unresolved: Vec<UnresolvedPredecessor>,
}

fn build_graph(projects: &[Project]) -> Graph {
    let nodes: Vec<Locator> = tree::walk(projects)
        .into_iter()
        .filter(|loc| !tree::is_hidden(projects, *loc))
        .collect();

    // Flat id index over tasks and child tasks, in walk order
    let mut index: IndexMap<String, usize> = IndexMap::new();
    for (i, loc) in nodes.iter().enumerate() {
        if loc.level() == Level::Project {
            continue;
        }
        if let Some(entity) = tree::entity_at(projects, *loc) {
            index.entry(entity.base().id.clone()).or_insert(i);
        }
    }

    let mut unresolved = Vec::new();
    let mut edges: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
    for loc in &nodes {
        let mut resolved = Vec::new();
        if let Some(entity) = tree::entity_at(projects, *loc) {
            let base = entity.base();
            for pred in base.predecessor_ids() {
                match index.get(pred) {
                    Some(&j) => resolved.push(j),
                    None => {
                        tracing::debug!(entity = %base.id, predecessor = pred, "predecessor not found");
                        unresolved.push(UnresolvedPredecessor {
                            entity_id: base.id.clone(),
                            predecessor: pred.to_string(),
                        });
                    }
                }
            }
        }
        edges.push(resolved);
    }
    Graph { nodes, edges, unresolved }
}

/// Ids of live entities that sit on a predecessor cycle, in walk order.
pub fn find_cycles(projects: &[Project]) -> Vec<String> {
    let graph = build_graph(projects);
    cycle_ids(projects, &graph.nodes, &cycle_members(&graph.edges))
}

fn cycle_ids(projects: &[Project], nodes: &[Locator], on_cycle: &[bool]) -> Vec<String> {
    nodes
        .iter()
        .zip(on_cycle)
        .filter(|(_, cyclic)| **cyclic)
        .filter_map(|(loc, _)| tree::entity_at(projects, *loc))
        .map(|e| e.base().id.clone())
        .collect()
}

/// Recompute start, end and plan-days for every live entity in the tree.
pub fn reschedule_in_place(projects: &mut [Project], project_start: NaiveDate) -> ScheduleReport {
    let Graph { nodes, edges, unresolved } = build_graph(projects);
    let on_cycle = cycle_members(&edges);
    let cyclic = cycle_ids(projects, &nodes, &on_cycle);
    for id in &cyclic {
        tracing::warn!(entity = %id, "predecessor cycle; dates left as they are");
    }
    let mut report = ScheduleReport {
        unresolved,
        cyclic,
        ..ScheduleReport::default()
    };

    for i in dependency_order(&edges) {
        if on_cycle[i] {
            continue;
        }
        if schedule_one(projects, &nodes, &edges[i], nodes[i], project_start, &mut report) {
            report.updated += 1;
        }
    }
    report
}

/// Depth-first post-order over predecessor edges, roots taken in walk
/// order. Edges back into the current path are not followed.
fn dependency_order(edges: &[Vec<usize>]) -> Vec<usize> {
    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut order = Vec::with_capacity(edges.len());

    for root in 0..edges.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        // (node, next edge to follow)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::Visiting;
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&pred) = edges[node].get(top.1) {
                top.1 += 1;
                if marks[pred] == Mark::Unvisited {
                    marks[pred] = Mark::Visiting;
                    stack.push((pred, 0));
                }
            } else {
                marks[node] = Mark::Done;
                order.push(node);
                stack.pop();
            }
        }
    }
    order
}

/// Nodes in a strongly connected component of more than one node, or with
/// an edge to themselves (iterative Tarjan).
fn cycle_members(edges: &[Vec<usize>]) -> Vec<bool> {
    const UNSEEN: usize = usize::MAX;
    let n = edges.len();
    let mut index = vec![UNSEEN; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut on_cycle = vec![false; n];
    let mut stack = Vec::new();
    let mut next = 0;

    for root in 0..n {
        if index[root] != UNSEEN {
            continue;
        }
        index[root] = next;
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut work: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(top) = work.last_mut() {
            let node = top.0;
            if let Some(&succ) = edges[node].get(top.1) {
                top.1 += 1;
                if index[succ] == UNSEEN {
                    index[succ] = next;
                    low[succ] = next;
                    next += 1;
                    stack.push(succ);
                    on_stack[succ] = true;
                    work.push((succ, 0));
                } else if on_stack[succ] {
                    low[node] = low[node].min(index[succ]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] != index[node] {
                continue;
            }
            let mut members = Vec::new();
            while let Some(m) = stack.pop() {
                on_stack[m] = false;
                members.push(m);
                if m == node {
                    break;
                }
            }
            if members.len() > 1 || edges[node].contains(&node) {
                for m in members {
                    on_cycle[m] = true;
                }
            }
        }
    }
    on_cycle
}

fn schedule_one(
    projects: &mut [Project],
    nodes: &[Locator],
    preds: &[usize],
    loc: Locator,
    project_start: NaiveDate,
    report: &mut ScheduleReport,
) -> bool {
    let Some(entity) = tree::entity_at(projects, loc) else {
        return false;
    };
    let base = entity.base();
    let is_root = loc.level() == Level::Project;
    let has_preds = !base.predecessor_ids().is_empty();

    let mut start = base.timeline.start;
    if has_preds {
        let mut latest: Option<NaiveDate> = None;
        for &j in preds {
            let Some(pred) = tree::entity_at(projects, nodes[j]) else {
                continue;
            };
            match pred.base().timeline.end {
                Some(end) => latest = latest.max(Some(end)),
                None => report.unresolved.push(UnresolvedPredecessor {
                    entity_id: base.id.clone(),
                    predecessor: pred.base().id.clone(),
                }),
            }
        }
        if let Some(next) = latest.and_then(|end| end.checked_add_days(Days::new(1))) {
            start = Some(next);
        }
    } else if is_root || start.is_none() {
        start = Some(project_start);
    }

    let mut end = base.timeline.end;
    // A root without predecessors keeps its end: plan-days never move it
    if (has_preds || !is_root)
        && base.plan_days > 0
        && let Some(s) = start
    {
        end = s.checked_add_days(Days::new(u64::from(base.plan_days) - 1));
    }

    let before = (base.timeline, base.plan_days);
    let Some(mut entity) = tree::entity_at_mut(projects, loc) else {
        return false;
    };
    let base = entity.base_mut();
    base.timeline.start = start;
    base.timeline.end = end;
    base.sync_plan_days();
    before != (base.timeline, base.plan_days)
}
