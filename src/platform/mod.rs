pub mod shortcut;

use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};

pub use shortcut::create_desktop_shortcut;

/// How long a child gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(3);

pub const APP_DIR_NAME: &str = "ytdlp-gui";

/// Executable file name of the tool on this platform.
pub fn executable_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Release asset that runs natively on this platform.
pub fn release_asset_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        "yt-dlp_linux"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "yt-dlp_linux_aarch64"
    } else {
        "yt-dlp"
    }
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Fixed location of the binary fetched by the setup panel.
pub fn managed_binary_path() -> PathBuf {
    data_dir().join("bin").join(executable_name())
}

pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Command that does not flash a console window on Windows.
pub fn hidden_command(program: impl AsRef<OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut command = Command::new(program);
    #[cfg(target_os = "windows")]
    command.creation_flags(0x08000000);
    command
}

/// Stop a child with SIGTERM, escalating to a kill after [`TERMINATE_GRACE`].
pub async fn shutdown_child(child: &mut Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            // Already reaped.
            return child.wait().await;
        };
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            if e == nix::errno::Errno::ESRCH {
                return child.wait().await;
            }
            return Err(io::Error::other(e));
        }
        if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            return status;
        }
        log::warn!("child {pid} ignored SIGTERM, killing");
    }

    child.kill().await?;
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_binary_path_ends_with_executable() {
        let path = managed_binary_path();
        assert!(path.ends_with(PathBuf::from("bin").join(executable_name())));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_shutdown_terminates_running_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let status = shutdown_child(&mut child).await.unwrap();
        assert!(!status.success());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_shutdown_after_exit() {
        let mut child = Command::new("true").spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(shutdown_child(&mut child).await.is_ok());
    }
}
