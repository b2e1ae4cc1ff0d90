use std::path::Path;

use crate::cli::commands::InitArgs;
use crate::io::board_io::{self, BOARD_DIR};

/// Infer a board name from a directory name: replace hyphens with spaces, title-case.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + chars.as_str()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn cmd_init(args: InitArgs, dir: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let root = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };

    if let Some(parent) = root.parent()
        && let Ok(outer) = board_io::discover_board(parent)
    {
        eprintln!("Note: enclosing board found at {}/", outer.dir.display());
        eprintln!("Creating new board in ./{}/", BOARD_DIR);
    }

    let name = args.name.unwrap_or_else(|| {
        root.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let (paths, config) = board_io::init_board(&root, &name)?;
    tracing::debug!(dir = %paths.dir.display(), "board initialized");
    println!("Initialized board: {}", config.project.name);
    println!("  store: {}", paths.store(&config).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_name() {
        assert_eq!(infer_name("my-cool-project"), "My Cool Project");
        assert_eq!(infer_name("planboard"), "Planboard");
        assert_eq!(infer_name("q3_launch"), "Q3 Launch");
        assert_eq!(infer_name("--"), "");
    }
}
