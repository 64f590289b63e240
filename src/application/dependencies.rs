use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::platform::{executable_name, hidden_command};

/// Python packages yt-dlp needs or benefits from.
pub const REQUIRED_PACKAGES: &[&str] = &[
    "yt-dlp",
    "mutagen",
    "pycryptodomex",
    "websockets",
    "brotli",
    "certifi",
];

#[cfg(target_os = "windows")]
const PYTHON_CANDIDATES: &[&str] = &["python", "py"];

#[cfg(not(target_os = "windows"))]
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Result of one dependency check, handed to the UI by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub python: Option<String>,
    pub missing_packages: Vec<String>,
}

impl DependencyReport {
    /// Program to launch for downloads. Falls back to the bare name so a
    /// missing tool surfaces as executable-not-found at spawn time.
    pub fn ytdlp_program(&self) -> PathBuf {
        self.ytdlp
            .clone()
            .unwrap_or_else(|| PathBuf::from(executable_name()))
    }

    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(match &self.ytdlp {
            Some(path) => format!("yt-dlp: {}", path.display()),
            None => "yt-dlp: not found".to_string(),
        });
        lines.push(match &self.ffmpeg {
            Some(path) => format!("ffmpeg: {}", path.display()),
            None => "ffmpeg: not found (merging and audio extraction need it)".to_string(),
        });
        match &self.python {
            Some(python) if self.missing_packages.is_empty() => {
                lines.push(format!("Python: {python}, all packages present"));
            }
            Some(python) => lines.push(format!(
                "Python: {python}, missing packages: {}",
                self.missing_packages.join(", ")
            )),
            None => lines.push("Python: not found".to_string()),
        }
        lines
    }
}

/// Locate the tool: the managed binary first, then `PATH`.
pub fn locate_ytdlp(managed: &Path) -> Option<PathBuf> {
    if managed.is_file() {
        return Some(managed.to_path_buf());
    }
    which::which(executable_name()).ok()
}

pub async fn check_dependencies(managed: PathBuf) -> DependencyReport {
    let ytdlp = locate_ytdlp(&managed);
    let ffmpeg = which::which("ffmpeg").ok();
    let python = find_python().await;

    let mut missing_packages = Vec::new();
    if let Some(python) = &python {
        for package in REQUIRED_PACKAGES {
            if !package_installed(python, package).await {
                missing_packages.push(package.to_string());
            }
        }
    }

    let report = DependencyReport {
        ytdlp,
        ffmpeg,
        python,
        missing_packages,
    };
    log::info!("dependency check: {:?}", report);
    report
}

async fn find_python() -> Option<String> {
    for candidate in PYTHON_CANDIDATES {
        let status = hidden_command(candidate)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if matches!(status, Ok(s) if s.success()) {
            return Some(candidate.to_string());
        }
    }
    log::warn!("no Python interpreter found");
    None
}

async fn package_installed(python: &str, package: &str) -> bool {
    hidden_command(python)
        .args(["-m", "pip", "show", "--quiet", package])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
