use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pb", about = concat!("planboard v", env!("CARGO_PKG_VERSION"), " - projects, tasks and timelines"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different board directory
    #[arg(short = 'C', long = "board-dir", global = true)]
    pub board_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new board in the current directory
    Init(InitArgs),
    /// List projects with their tasks
    List(ListArgs),
    /// Show one project, task or child task
    Show(ShowArgs),
    /// Add a project
    AddProject(AddProjectArgs),
    /// Add a task to a project
    AddTask(AddTaskArgs),
    /// Add a child task to a task
    AddChild(AddChildArgs),
    /// Change one field of an entity
    Edit(EditArgs),
    /// Move an entity among its siblings
    Mv(MvArgs),
    /// Delete entities (tasks can be restored with `undo`)
    Delete(DeleteArgs),
    /// Restore the most recent deletion
    Undo,
    /// Close the undo prompt, keeping the deletion
    Dismiss,
    /// Permanently remove deleted entities
    Purge(PurgeArgs),
    /// Copy entities to the clipboard
    Copy(CopyArgs),
    /// Paste the clipboard
    Paste(PasteArgs),
    /// Recompute every timeline from predecessors
    Schedule,
    /// Validate board integrity
    Check,
    /// Search names, ids and reference numbers by regex
    Search(SearchArgs),
    /// Read or change configuration
    Config(ConfigCmd),
}

#[derive(Args)]
pub struct InitArgs {
    /// Board name (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Include deleted entities
    #[arg(long)]
    pub all: bool,
    /// Only pinned projects
    #[arg(long)]
    pub pinned: bool,
    /// Only projects with this status
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Entity id or reference number
    pub id: String,
}

#[derive(Args)]
pub struct AddProjectArgs {
    /// Reference number, e.g. PRJ-1
    pub reference: String,
    /// Project name
    pub name: String,
}

#[derive(Args)]
pub struct AddTaskArgs {
    /// Project id or reference number
    pub project: String,
    /// Task name
    pub name: String,
    /// Category (design, development, testing, review or DES/DEV/TST/REV)
    #[arg(long, default_value = "design")]
    pub category: String,
}

#[derive(Args)]
pub struct AddChildArgs {
    /// Task id or reference number
    pub task: String,
    /// Child task name
    pub name: String,
    /// Category (design, development, testing, review or DES/DEV/TST/REV)
    #[arg(long, default_value = "design")]
    pub category: String,
}

#[derive(Args)]
pub struct EditArgs {
    /// Entity id or reference number
    pub id: String,
    /// Field: name, ref, category, start, end, timeline, plan-days,
    /// predecessors, status, pinned
    pub field: String,
    /// New value (`none` clears a date)
    pub value: String,
}

#[derive(Args)]
pub struct MvArgs {
    /// Entity id or reference number
    pub id: String,
    /// Move to the top
    #[arg(long, conflicts_with_all = ["bottom", "after"])]
    pub top: bool,
    /// Move to the bottom
    #[arg(long, conflicts_with = "after")]
    pub bottom: bool,
    /// Place directly after this sibling
    #[arg(long)]
    pub after: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Entity ids or reference numbers
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Args)]
pub struct PurgeArgs {
    /// A single deleted entity; all deleted entities when omitted
    pub id: Option<String>,
}

#[derive(Args)]
pub struct CopyArgs {
    /// Entity ids or reference numbers
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Args)]
pub struct PasteArgs {
    /// Project to paste tasks into
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Regex pattern
    pub pattern: String,
    /// Only search this project
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Set a key, e.g. `project.start_date 2024-01-01`
    Set { key: String, value: String },
}
