use crate::model::entity::{ProjectStatus, TaskStatus};
use crate::model::project::Project;
use crate::model::task::Task;

/// Re-derive task status, project status and project progress for the
/// whole tree. Soft-deleted entities are ignored.
pub fn aggregate(projects: &mut [Project]) {
    for project in projects.iter_mut().filter(|p| !p.base.is_deleted) {
        aggregate_project(project);
    }
}

/// Apply the roll-up rules to one project:
/// - a task with live children is `done` exactly when all of them are done
///   (a `done` task whose children are no longer all done drops to `working`);
/// - a project with live tasks is `done` exactly when all of them are done
///   (dropping to `in-progress` otherwise);
/// - project progress is the mean of its live tasks' derived progress.
pub fn aggregate_project(project: &mut Project) {
    for task in project.subtasks.iter_mut().filter(|t| !t.base.is_deleted) {
        aggregate_task(task);
    }

    let (count, sum, all_done) = project.live_tasks().fold((0u32, 0u32, true), |(n, s, d), t| {
        (
            n + 1,
            s + u32::from(t.derived_progress()),
            d && t.status == TaskStatus::Done,
        )
    });
    if count == 0 {
        project.progress = if project.status == ProjectStatus::Done { 100 } else { 0 };
        return;
    }

    project.progress = (sum / count) as u8;

    if all_done {
        project.status = ProjectStatus::Done;
    } else if project.status == ProjectStatus::Done {
        project.status = ProjectStatus::InProgress;
    }
}

pub fn aggregate_task(task: &mut Task) {
    let mut any = false;
    let mut all_done = true;
    for child in task.live_children() {
        any = true;
        all_done &= child.status == TaskStatus::Done;
    }
    if !any {
        return;
    }
    if all_done {
        task.status = TaskStatus::Done;
    } else if task.status == TaskStatus::Done {
        task.status = TaskStatus::Working;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::Category;
    use crate::model::task::ChildTask;

    fn task_with_children(id: &str, statuses: &[TaskStatus]) -> Task {
        let mut t = Task::new(id.into(), id.into(), Category::Development);
        for (i, s) in statuses.iter().enumerate() {
            let mut c = ChildTask::new(format!("{id}-{i}"), "c".into(), Category::Testing, id.into());
            c.status = *s;
            t.child_subtasks.push(c);
        }
        t
    }

    #[test]
    fn task_done_when_all_children_done() {
        let mut t = task_with_children("t", &[TaskStatus::Done, TaskStatus::Done]);
        aggregate_task(&mut t);
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn done_task_reopens_when_child_reopens() {
        let mut t = task_with_children("t", &[TaskStatus::Done, TaskStatus::Stuck]);
        t.status = TaskStatus::Done;
        aggregate_task(&mut t);
        assert_eq!(t.status, TaskStatus::Working);
    }

    #[test]
    fn deleted_children_do_not_block_completion() {
        let mut t = task_with_children("t", &[TaskStatus::Done, TaskStatus::Working]);
        t.child_subtasks[1].base.is_deleted = true;
        aggregate_task(&mut t);
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn childless_task_keeps_manual_status() {
        let mut t = task_with_children("t", &[]);
        t.status = TaskStatus::Stuck;
        aggregate_task(&mut t);
        assert_eq!(t.status, TaskStatus::Stuck);
    }

    #[test]
    fn project_progress_is_mean_of_tasks() {
        let mut p = Project::new("p".into(), "PRJ-1".into(), "P".into());
        p.subtasks.push(task_with_children("a", &[TaskStatus::Done, TaskStatus::Working]));
        p.subtasks.push(task_with_children("b", &[TaskStatus::Done]));
        aggregate_project(&mut p);
        assert_eq!(p.progress, 75);
        assert_eq!(p.status, ProjectStatus::Pending);
    }

    #[test]
    fn project_done_when_all_tasks_done() {
        let mut p = Project::new("p".into(), "PRJ-1".into(), "P".into());
        p.subtasks.push(task_with_children("a", &[TaskStatus::Done]));
        let mut gone = task_with_children("b", &[TaskStatus::Working]);
        gone.base.is_deleted = true;
        p.subtasks.push(gone);
        aggregate_project(&mut p);
        assert_eq!(p.status, ProjectStatus::Done);
        assert_eq!(p.progress, 100);
    }
}
