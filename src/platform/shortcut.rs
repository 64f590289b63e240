use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::TaskError;

const SHORTCUT_NAME: &str = "yt-dlp GUI";

/// Write a launcher for `exe` into `desktop` and return its path.
pub fn create_desktop_shortcut(exe: &Path, desktop: &Path) -> Result<PathBuf, TaskError> {
    if !desktop.is_dir() {
        fs::create_dir_all(desktop).map_err(|e| TaskError::DirectoryCreation {
            path: desktop.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    let (file_name, contents) = shortcut_contents(exe);
    let path = desktop.join(file_name);
    fs::write(&path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }

    log::info!("created desktop shortcut at {}", path.display());
    Ok(path)
}

#[cfg(target_os = "windows")]
fn shortcut_contents(exe: &Path) -> (String, String) {
    let target = url::Url::from_file_path(exe)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| exe.display().to_string());
    (
        format!("{SHORTCUT_NAME}.url"),
        format!(
            "[InternetShortcut]\r\nURL={target}\r\nIconFile={}\r\nIconIndex=0\r\n",
            exe.display()
        ),
    )
}

#[cfg(target_os = "macos")]
fn shortcut_contents(exe: &Path) -> (String, String) {
    (
        format!("{SHORTCUT_NAME}.command"),
        format!("#!/bin/sh\nexec {} \"$@\"\n", shell_quote(exe)),
    )
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn shortcut_contents(exe: &Path) -> (String, String) {
    (
        "ytdlp-gui.desktop".to_string(),
        format!(
            "[Desktop Entry]\nType=Application\nName={SHORTCUT_NAME}\nComment=Download media with yt-dlp\nExec=\"{}\"\nTerminal=false\nCategories=Network;AudioVideo;\n",
            desktop_entry_escape(exe)
        ),
    )
}

/// Escape a path for a double-quoted `Exec` key.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn desktop_entry_escape(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(target_os = "macos")]
fn shell_quote(path: &Path) -> String {
    shell_words::quote(&path.to_string_lossy()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_missing_desktop_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let desktop = tmp.path().join("Desktop");
        let exe = tmp.path().join("ytdlp-gui");

        let path = create_desktop_shortcut(&exe, &desktop).unwrap();
        assert!(path.starts_with(&desktop));
        assert!(path.is_file());
    }

    #[test]
    #[cfg(all(unix, not(target_os = "macos")))]
    fn test_desktop_entry_quotes_exec_path() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("my apps").join("ytdlp-gui");

        let path = create_desktop_shortcut(&exe, tmp.path()).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("[Desktop Entry]"));
        assert!(contents.contains(&format!("Exec=\"{}\"", exe.display())));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
