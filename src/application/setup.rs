use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::{stream::BoxStream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Split};
use tokio_util::sync::CancellationToken;

use crate::{
    api::ApiClient,
    domain::{TaskError, TaskEvent, TaskOutcome},
    platform::{hidden_command, shutdown_child},
};

#[derive(Clone)]
pub struct SetupCoordinator {
    api_client: ApiClient,
}

impl SetupCoordinator {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    /// Download the release asset named `asset_name` to `dest`.
    pub fn fetch_binary(
        &self,
        asset_name: String,
        dest: PathBuf,
        cancel: CancellationToken,
    ) -> BoxStream<'static, TaskEvent> {
        futures::stream::unfold(
            FetchState::Start {
                client: self.api_client.clone(),
                asset_name,
                dest,
                cancel,
            },
            |state| async move {
                match state {
                    FetchState::Start {
                        client,
                        asset_name,
                        dest,
                        cancel,
                    } => {
                        if cancel.is_cancelled() {
                            return Some(finished(TaskOutcome::Cancelled));
                        }
                        Some((
                            TaskEvent::Setup("Querying latest yt-dlp release...".to_string()),
                            FetchState::Resolve {
                                client,
                                asset_name,
                                dest,
                                cancel,
                            },
                        ))
                    }
                    FetchState::Resolve {
                        client,
                        asset_name,
                        dest,
                        cancel,
                    } => {
                        let part = part_path(&dest);
                        let opened = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(TaskError::Cancelled),
                            opened = open_download(&client, &asset_name, dest, cancel.clone()) => opened,
                        };
                        match opened {
                            Ok((message, transfer)) => Some((
                                TaskEvent::Setup(message),
                                FetchState::Downloading(Box::new(transfer)),
                            )),
                            Err(TaskError::Cancelled) => {
                                remove_partial(&part).await;
                                Some(finished(TaskOutcome::Cancelled))
                            }
                            Err(e) => Some(finished(TaskOutcome::from(Err(e)))),
                        }
                    }
                    FetchState::Downloading(transfer) => Some(transfer.advance().await),
                    FetchState::Report(outcome) => Some(finished(outcome)),
                    FetchState::Finished => None,
                }
            },
        )
        .boxed()
    }

    /// Run `<python> -m pip install <packages...>` and report its output as one block.
    pub fn install_packages(
        &self,
        python: String,
        packages: Vec<String>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, TaskEvent> {
        futures::stream::unfold(
            InstallState::Start {
                python,
                packages,
                cancel,
            },
            |state| async move {
                match state {
                    InstallState::Start {
                        python,
                        packages,
                        cancel,
                    } => {
                        if cancel.is_cancelled() {
                            return Some((
                                TaskEvent::Finished(TaskOutcome::Cancelled),
                                InstallState::Finished,
                            ));
                        }
                        if packages.is_empty() {
                            return Some((
                                TaskEvent::Finished(TaskOutcome::Succeeded(
                                    "No missing packages".to_string(),
                                )),
                                InstallState::Finished,
                            ));
                        }
                        Some((
                            TaskEvent::Setup(format!("Installing {}...", packages.join(", "))),
                            InstallState::Run {
                                python,
                                packages,
                                cancel,
                            },
                        ))
                    }
                    InstallState::Run {
                        python,
                        packages,
                        cancel,
                    } => match run_installer(&python, &packages, &cancel).await {
                        Ok((log, outcome)) => {
                            Some((TaskEvent::Setup(log), InstallState::Report(outcome)))
                        }
                        Err(e) => Some((
                            TaskEvent::Finished(TaskOutcome::from(Err(e))),
                            InstallState::Finished,
                        )),
                    },
                    InstallState::Report(outcome) => {
                        Some((TaskEvent::Finished(outcome), InstallState::Finished))
                    }
                    InstallState::Finished => None,
                }
            },
        )
        .boxed()
    }
}

enum FetchState {
    Start {
        client: ApiClient,
        asset_name: String,
        dest: PathBuf,
        cancel: CancellationToken,
    },
    Resolve {
        client: ApiClient,
        asset_name: String,
        dest: PathBuf,
        cancel: CancellationToken,
    },
    Downloading(Box<Transfer>),
    Report(TaskOutcome),
    Finished,
}

fn finished(outcome: TaskOutcome) -> (TaskEvent, FetchState) {
    (TaskEvent::Finished(outcome), FetchState::Finished)
}

struct Transfer {
    file: tokio::fs::File,
    stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
    downloaded: u64,
    total: Option<u64>,
    next_mark: u8,
    part: PathBuf,
    dest: PathBuf,
    cancel: CancellationToken,
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn open_download(
    client: &ApiClient,
    asset_name: &str,
    dest: PathBuf,
    cancel: CancellationToken,
) -> Result<(String, Transfer), TaskError> {
    let release = client.latest_release().await?;
    let asset = release
        .find_asset(asset_name)
        .ok_or_else(|| TaskError::AssetNotFound(asset_name.to_string()))?;
    log::info!(
        "fetching {} from release {}",
        asset.browser_download_url,
        release.tag_name
    );

    if cancel.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TaskError::DirectoryCreation {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
    }

    let (total, stream) = client
        .download_file_stream(&asset.browser_download_url)
        .await?;
    let total = total.or((asset.size > 0).then_some(asset.size));

    let part = part_path(&dest);
    let file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| TaskError::Io(format!("Failed to create file: {}", e)))?;

    let size = match total {
        Some(bytes) => format!(" ({:.1} MiB)", bytes as f64 / (1024.0 * 1024.0)),
        None => String::new(),
    };
    let message = format!(
        "Downloading {} from release {}{}",
        asset.name, release.tag_name, size
    );

    Ok((
        message,
        Transfer {
            file,
            stream: stream.boxed(),
            downloaded: 0,
            total,
            next_mark: 25,
            part,
            dest,
            cancel,
        },
    ))
}

impl Transfer {
    /// Pull chunks until there is something to report.
    async fn advance(mut self: Box<Self>) -> (TaskEvent, FetchState) {
        loop {
            let next = {
                let Transfer { stream, cancel, .. } = &mut *self;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = stream.next() => Some(next),
                }
            };
            let Some(next) = next else {
                self.discard().await;
                return finished(TaskOutcome::Cancelled);
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Err(e) = self.file.write_all(&chunk).await {
                        self.discard().await;
                        return finished(TaskOutcome::Failed(TaskError::Io(format!(
                            "Write error: {}",
                            e
                        ))));
                    }
                    self.downloaded += chunk.len() as u64;

                    if let Some(percent) = self.percent() {
                        if percent >= self.next_mark && percent < 100 {
                            self.next_mark = (percent / 25 + 1) * 25;
                            let message = format!("Downloaded {percent}%");
                            return (
                                TaskEvent::Setup(message),
                                FetchState::Downloading(self),
                            );
                        }
                    }
                }
                Some(Err(e)) => {
                    self.discard().await;
                    return finished(TaskOutcome::Failed(e.into()));
                }
                None => {
                    let dest = self.dest.clone();
                    return match self.complete().await {
                        Ok(()) => (
                            TaskEvent::Setup("Download finished".to_string()),
                            FetchState::Report(TaskOutcome::Succeeded(format!(
                                "yt-dlp saved to {}",
                                dest.display()
                            ))),
                        ),
                        Err(e) => finished(TaskOutcome::Failed(e)),
                    };
                }
            }
        }
    }

    fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|t| *t > 0)?;
        Some((self.downloaded.saturating_mul(100) / total).min(100) as u8)
    }

    async fn complete(self: Box<Self>) -> Result<(), TaskError> {
        let Transfer {
            mut file,
            part,
            dest,
            ..
        } = *self;

        let result = async {
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&part, std::fs::Permissions::from_mode(0o755)).await?;
            }

            tokio::fs::rename(&part, &dest).await
        }
        .await;

        if let Err(e) = result {
            remove_partial(&part).await;
            return Err(TaskError::Io(format!(
                "Failed to install {}: {e}",
                dest.display()
            )));
        }
        log::info!("saved {}", dest.display());
        Ok(())
    }

    async fn discard(&mut self) {
        remove_partial(&self.part).await;
    }
}

async fn remove_partial(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to remove {}: {e}", part.display()),
    }
}

enum InstallState {
    Start {
        python: String,
        packages: Vec<String>,
        cancel: CancellationToken,
    },
    Run {
        python: String,
        packages: Vec<String>,
        cancel: CancellationToken,
    },
    Report(TaskOutcome),
    Finished,
}

async fn run_installer(
    python: &str,
    packages: &[String],
    cancel: &CancellationToken,
) -> Result<(String, TaskOutcome), TaskError> {
    log::info!("running {python} -m pip install {}", packages.join(" "));
    let mut child = hidden_command(python)
        .args(["-m", "pip", "install"])
        .args(packages)
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TaskError::ExecutableNotFound(python.to_string()),
            _ => TaskError::Io(format!("Failed to start installer: {e}")),
        })?;

    let stdout = child.stdout.take().map(|out| BufReader::new(out).split(b'\n'));
    let stderr = child.stderr.take().map(|err| BufReader::new(err).split(b'\n'));

    let collected = {
        let collect = async {
            let (output, status) = tokio::join!(merge_lines(stdout, stderr), child.wait());
            Ok::<_, std::io::Error>((output?, status?))
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = collect => Some(result),
        }
    };

    let Some(result) = collected else {
        if let Err(e) = shutdown_child(&mut child).await {
            log::warn!("failed to stop installer: {e}");
        }
        return Err(TaskError::Cancelled);
    };

    let (output, status) = result?;
    let log = output.join("\n").trim().to_string();
    let outcome = if status.success() {
        TaskOutcome::Succeeded(format!("Installed {}", packages.join(", ")))
    } else {
        TaskOutcome::Failed(TaskError::NonZeroExit(status.to_string()))
    };
    Ok((log, outcome))
}

/// Read both pipes to the end, keeping lines in the order they arrive.
/// Lines are decoded lossily.
async fn merge_lines<O, E>(
    mut stdout: Option<Split<O>>,
    mut stderr: Option<Split<E>>,
) -> std::io::Result<Vec<String>>
where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    let mut output = Vec::new();
    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line? {
                Some(line) => output.push(line),
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line? {
                Some(line) => output.push(line),
                None => stderr = None,
            },
        }
    }
    Ok(output)
}

async fn next_line<R: AsyncBufRead + Unpin>(
    lines: &mut Option<Split<R>>,
) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => Ok(lines
            .next_segment()
            .await?
            .map(|line| String::from_utf8_lossy(&line).trim_end().to_string())),
        None => std::future::pending().await,
    }
}
