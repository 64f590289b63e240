use std::path::Path;

use crate::domain::TaskError;

/// Create `dir` if it is missing; only a failed creation is an error.
pub fn ensure_directory(dir: &Path) -> Result<(), TaskError> {
    if dir.is_dir() {
        return Ok(());
    }
    log::info!("creating download directory {}", dir.display());
    std::fs::create_dir_all(dir).map_err(|e| TaskError::DirectoryCreation {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Render a program and its arguments the way a shell would accept them.
pub fn format_command_line(program: &Path, args: &[String]) -> String {
    let program = shell_words::quote(&program.to_string_lossy()).into_owned();
    if args.is_empty() {
        return program;
    }
    format!("{} {}", program, shell_words::join(args))
}
