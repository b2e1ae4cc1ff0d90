mod init;
pub use init::cmd_init;

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;
use regex::Regex;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::board_io::{self, BoardPaths};
use crate::io::cache::LocalCache;
use crate::io::config_io;
use crate::io::gateway::{FileGateway, ProjectFilter};
use crate::io::lock::FileLock;
use crate::io::state;
use crate::io::sync::{LoadSource, Synchronizer};
use crate::model::entity::{Category, ProjectStatus};
use crate::model::project::Project;
use crate::model::tree::{self, EntityRef};
use crate::ops::clipboard::PasteError;
use crate::ops::tree_ops::InsertPosition;
use crate::session::Session;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let dir = match cli.board_dir {
        Some(ref dir) => Some(
            std::fs::canonicalize(dir)
                .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        ),
        None => None,
    };

    match cli.command {
        Commands::Init(args) => cmd_init(args, dir.as_deref()),
        Commands::Config(cmd) => cmd_config(cmd, dir, json),
        command => {
            let mut board = Board::open(dir)?;
            let result = run(&mut board, command, json);
            // Persist session state even when the command failed midway
            board.finish()?;
            result
        }
    }
}

fn run(board: &mut Board, command: Commands, json: bool) -> CmdResult {
    match command {
        // Read commands
        Commands::List(args) => cmd_list(board, args, json),
        Commands::Show(args) => cmd_show(board, args, json),
        Commands::Check => cmd_check(board, json),
        Commands::Search(args) => cmd_search(board, args, json),

        // Write commands
        Commands::AddProject(args) => cmd_add_project(board, args, json),
        Commands::AddTask(args) => cmd_add_task(board, args, json),
        Commands::AddChild(args) => cmd_add_child(board, args, json),
        Commands::Edit(args) => cmd_edit(board, args),
        Commands::Mv(args) => cmd_mv(board, args),
        Commands::Delete(args) => cmd_delete(board, args, json),
        Commands::Undo => cmd_undo(board),
        Commands::Dismiss => {
            board.session.dismiss();
            Ok(())
        }
        Commands::Purge(args) => cmd_purge(board, args),
        Commands::Copy(args) => cmd_copy(board, args),
        Commands::Paste(args) => cmd_paste(board, args, json),
        Commands::Schedule => cmd_schedule(board, json),

        Commands::Init(_) | Commands::Config(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Board context
// ---------------------------------------------------------------------------

/// A loaded session plus where it came from
struct Board {
    paths: BoardPaths,
    session: Session,
}

impl Board {
    fn open(dir: Option<PathBuf>) -> Result<Board, Box<dyn std::error::Error>> {
        let start = match dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let paths = board_io::discover_board(&start)?;
        let config = board_io::load_config(&paths)?;
        let gateway = FileGateway::new(paths.store(&config));
        let sync = Synchronizer::new(Box::new(gateway), LocalCache::new(paths.cache()));

        let mut session = Session::new(config, sync);
        if let Some(saved) = state::read_state(&paths.state()) {
            session = session.with_state(saved);
        }
        // Close an undo window that ran out between invocations
        session.tick(Utc::now());
        if session.load() == LoadSource::Cache {
            eprintln!("warning: store unavailable, using cached data");
        }
        Ok(Board { paths, session })
    }

    /// Write session state and report notices from the synchronizer
    fn finish(&mut self) -> CmdResult {
        for notice in self.session.take_notices() {
            eprintln!("warning: {}", notice.message);
        }
        state::write_state(&self.paths.state(), &self.session.state())?;
        Ok(())
    }

    /// Accept an id or a reference number
    fn resolve(&self, key: &str, include_deleted: bool) -> Result<String, Box<dyn std::error::Error>> {
        resolve_id(self.session.projects(), key, include_deleted)
            .ok_or_else(|| format!("not found: {}", key).into())
    }
}

fn resolve_id(projects: &[Project], key: &str, include_deleted: bool) -> Option<String> {
    if let Some(loc) = tree::locate(projects, key)
        && (include_deleted || !tree::is_hidden(projects, loc))
    {
        return Some(key.to_string());
    }
    tree::walk(projects)
        .into_iter()
        .filter(|loc| include_deleted || !tree::is_hidden(projects, *loc))
        .filter_map(|loc| tree::entity_at(projects, loc))
        .find(|e| e.base().reference_number == key)
        .map(|e| e.base().id.clone())
}

fn parse_category(s: &str) -> Result<Category, String> {
    Category::parse(s).ok_or_else(|| {
        format!(
            "unknown category '{}' (expected: design, development, testing, review)",
            s
        )
    })
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(board: &mut Board, args: ListArgs, json: bool) -> CmdResult {
    let filter = ProjectFilter {
        pinned: args.pinned.then_some(true),
        status: args
            .status
            .as_deref()
            .map(|s| ProjectStatus::parse(s).ok_or_else(|| format!("unknown status '{}'", s)))
            .transpose()?,
    };
    let mut projects = if args.all {
        board.session.projects().to_vec()
    } else {
        board.session.active_view()
    };
    projects.retain(|p| filter.matches(p));

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for (i, project) in projects.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in format_project_tree(project) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_show(board: &mut Board, args: ShowArgs, json: bool) -> CmdResult {
    let id = board.resolve(&args.id, true)?;
    let projects = board.session.projects();
    let entity = tree::find_entity(projects, &id).ok_or_else(|| format!("not found: {}", args.id))?;
    if json {
        let text = match entity {
            EntityRef::Project(p) => serde_json::to_string_pretty(&ShowJson {
                level: entity.level(),
                entity: p,
            })?,
            EntityRef::Task(t) => serde_json::to_string_pretty(&ShowJson {
                level: entity.level(),
                entity: t,
            })?,
            EntityRef::ChildTask(c) => serde_json::to_string_pretty(&ShowJson {
                level: entity.level(),
                entity: c,
            })?,
        };
        println!("{}", text);
    } else {
        for line in format_entity_detail(entity) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_check(board: &mut Board, json: bool) -> CmdResult {
    let result = board.session.check();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if !result.errors.is_empty() {
            println!("Errors:");
            for err in &result.errors {
                println!("  {}", format_check_error(err));
            }
        }
        if !result.warnings.is_empty() {
            if !result.errors.is_empty() {
                println!();
            }
            println!("Warnings:");
            for warning in &result.warnings {
                println!("  {}", format_check_warning(warning));
            }
        }
        if result.valid && result.warnings.is_empty() {
            println!("Board is valid.");
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(format!("{} error(s) found", result.errors.len()).into())
    }
}

fn cmd_search(board: &mut Board, args: SearchArgs, json: bool) -> CmdResult {
    let re = Regex::new(&args.pattern)?;
    let hits = board.session.search(&re, args.project.as_deref());
    let projects = board.session.projects();

    // One line per entity even when several fields matched
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for hit in &hits {
        if !seen.insert(hit.entity_id.as_str()) {
            continue;
        }
        let Some(entity) = tree::find_entity(projects, &hit.entity_id) else {
            continue;
        };
        let project_ref = projects
            .iter()
            .find(|p| p.base.id == hit.project_id)
            .map(|p| p.base.reference_number.clone())
            .unwrap_or_default();
        out.push(SearchHitJson {
            project: project_ref,
            id: hit.entity_id.clone(),
            reference: entity.base().reference_number.clone(),
            name: entity.base().name.clone(),
            field: serde_json::to_value(hit.field)?
                .as_str()
                .unwrap_or_default()
                .to_string(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for hit in &out {
            println!("[{}] {} {}", hit.project, hit.reference, hit.name);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn print_created(board: &Board, id: &str, json: bool) -> CmdResult {
    let reference = tree::find_entity(board.session.projects(), id)
        .map(|e| e.base().reference_number.clone())
        .unwrap_or_default();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&CreatedJson {
                id: id.to_string(),
                reference,
            })?
        );
    } else {
        println!("{} {}", reference, id);
    }
    Ok(())
}

fn cmd_add_project(board: &mut Board, args: AddProjectArgs, json: bool) -> CmdResult {
    let id = board.session.add_project(&args.reference, &args.name)?;
    print_created(board, &id, json)
}

fn cmd_add_task(board: &mut Board, args: AddTaskArgs, json: bool) -> CmdResult {
    let category = parse_category(&args.category)?;
    let project_id = board.resolve(&args.project, false)?;
    let id = board.session.add_task(&project_id, &args.name, category)?;
    print_created(board, &id, json)
}

fn cmd_add_child(board: &mut Board, args: AddChildArgs, json: bool) -> CmdResult {
    let category = parse_category(&args.category)?;
    let task_id = board.resolve(&args.task, false)?;
    let id = board.session.add_child(&task_id, &args.name, category)?;
    print_created(board, &id, json)
}

fn cmd_edit(board: &mut Board, args: EditArgs) -> CmdResult {
    let id = board.resolve(&args.id, false)?;
    let value = if args.field == "predecessors" || args.field == "deps" {
        // Predecessors may be given by reference number too
        args.value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|key| {
                resolve_id(board.session.projects(), key, true).unwrap_or_else(|| key.to_string())
            })
            .collect::<Vec<_>>()
            .join(",")
    } else {
        args.value.clone()
    };
    board.session.edit(&id, &args.field, &value)?;
    Ok(())
}

fn cmd_mv(board: &mut Board, args: MvArgs) -> CmdResult {
    let id = board.resolve(&args.id, false)?;
    let position = if args.top {
        InsertPosition::Top
    } else if let Some(after) = &args.after {
        InsertPosition::After(board.resolve(after, true)?)
    } else {
        InsertPosition::Bottom
    };
    board.session.move_entity(&id, &position)?;
    Ok(())
}

fn cmd_delete(board: &mut Board, args: DeleteArgs, json: bool) -> CmdResult {
    let ids = args
        .ids
        .iter()
        .map(|key| resolve_id(board.session.projects(), key, false).unwrap_or_else(|| key.clone()))
        .collect::<Vec<_>>();
    let report = board.session.delete(&ids, Utc::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let prompt = board.session.undo_prompt();
        if prompt.is_visible && !report.soft_deleted.is_empty() {
            println!(
                "{} (run `pb undo` within {}s to restore)",
                prompt.message, board.session.config().undo.window_secs
            );
        }
        for id in &report.removed_projects {
            println!("project {} deleted", id);
        }
        for id in &report.skipped {
            eprintln!("skipped: {}", id);
        }
    }
    if report.failed_projects.is_empty() {
        Ok(())
    } else {
        Err(format!("could not delete: {}", report.failed_projects.join(", ")).into())
    }
}

fn cmd_undo(board: &mut Board) -> CmdResult {
    let restored = board.session.undo(Utc::now());
    if restored == 0 {
        return Err("nothing to undo".into());
    }
    println!("restored {}", restored);
    Ok(())
}

fn cmd_purge(board: &mut Board, args: PurgeArgs) -> CmdResult {
    let id = args
        .id
        .as_deref()
        .map(|key| board.resolve(key, true))
        .transpose()?;
    let removed = board.session.purge(id.as_deref())?;
    println!("purged {}", removed);
    Ok(())
}

fn cmd_copy(board: &mut Board, args: CopyArgs) -> CmdResult {
    let ids = args
        .ids
        .iter()
        .map(|key| board.resolve(key, false))
        .collect::<Result<Vec<_>, _>>()?;
    let (projects, tasks, children) = board.session.copy(&ids);
    println!(
        "copied {} project(s), {} task(s), {} child task(s)",
        projects, tasks, children
    );
    Ok(())
}

fn cmd_paste(board: &mut Board, args: PasteArgs, json: bool) -> CmdResult {
    // A second concurrent paste is dropped, not queued
    let _guard = FileLock::paste(&board.paths.dir).map_err(|_| PasteError::InProgress)?;
    let target = args
        .target
        .as_deref()
        .map(|key| board.resolve(key, false))
        .transpose()?;
    let outcome = board.session.paste(target.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "pasted {} project(s), {} task(s), {} child task(s)",
            outcome.projects.len(),
            outcome.tasks.len(),
            outcome.child_tasks.len()
        );
        for id in &outcome.dropped {
            eprintln!("dropped {}: its parent task is not in the target", id);
        }
    }
    Ok(())
}

fn cmd_schedule(board: &mut Board, json: bool) -> CmdResult {
    let report = board.session.schedule();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} timeline(s) updated", report.updated);
        for u in &report.unresolved {
            println!("  {}: predecessor {} not found", u.entity_id, u.predecessor);
        }
        for id in &report.cyclic {
            println!("  {}: on a predecessor cycle", id);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(cmd: ConfigCmd, dir: Option<PathBuf>, json: bool) -> CmdResult {
    let start = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let paths = board_io::discover_board(&start)?;
    let (config, mut doc) = config_io::read_config(&paths.dir)?;
    match cmd.action {
        ConfigAction::Show => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", toml::to_string(&config)?);
            }
        }
        ConfigAction::Set { key, value } => {
            config_io::set_value(&mut doc, &key, &value)?;
            config_io::write_config(&paths.dir, &doc)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::Task;

    fn board() -> Vec<Project> {
        let mut p = Project::new("P1".into(), "PRJ-1".into(), "Alpha".into());
        let mut t = Task::new("T1".into(), "Build".into(), Category::Development);
        t.base.reference_number = "PRJ-1.DEV-01".into();
        let mut gone = Task::new("T2".into(), "Old".into(), Category::Development);
        gone.base.reference_number = "PRJ-1.DEV-02".into();
        gone.base.is_deleted = true;
        p.subtasks.push(t);
        p.subtasks.push(gone);
        vec![p]
    }

    #[test]
    fn test_resolve_by_id_or_reference() {
        let b = board();
        assert_eq!(resolve_id(&b, "T1", false), Some("T1".into()));
        assert_eq!(resolve_id(&b, "PRJ-1.DEV-01", false), Some("T1".into()));
        assert_eq!(resolve_id(&b, "PRJ-1", false), Some("P1".into()));
        assert_eq!(resolve_id(&b, "nope", false), None);
    }

    #[test]
    fn test_resolve_hides_deleted_unless_asked() {
        let b = board();
        assert_eq!(resolve_id(&b, "PRJ-1.DEV-02", false), None);
        assert_eq!(resolve_id(&b, "T2", false), None);
        assert_eq!(resolve_id(&b, "PRJ-1.DEV-02", true), Some("T2".into()));
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("DEV"), Ok(Category::Development));
        assert_eq!(parse_category("testing"), Ok(Category::Testing));
        assert!(parse_category("ops").is_err());
    }
}
