use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use futures::{stream::BoxStream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio_util::sync::CancellationToken;

use super::progress::ProgressTracker;
use crate::domain::{OutputLine, TaskError, TaskEvent, TaskOutcome};
use crate::platform::{hidden_command, shutdown_child};

/// How long an unterminated segment may sit in a buffer before it is
/// forwarded as a line of its own.
const PARTIAL_LINE_FLUSH: Duration = Duration::from_millis(150);

/// Run `program` with `args` and stream its merged output as [`TaskEvent`]s.
///
/// The stream yields one `Output` per non-empty line, in arrival order, and
/// ends with exactly one `Finished`. The token is checked before every line
/// and while waiting for output; once set, the child is terminated and the
/// outcome is `Cancelled`. A token that is already set means no process is
/// ever spawned.
pub fn run_process(
    program: impl Into<OsString>,
    args: Vec<String>,
    cancel: CancellationToken,
) -> BoxStream<'static, TaskEvent> {
    futures::stream::unfold(
        RunnerState::Start {
            program: program.into(),
            args,
            cancel,
        },
        |state| async move {
            match state {
                RunnerState::Start {
                    program,
                    args,
                    cancel,
                } => {
                    if cancel.is_cancelled() {
                        return Some((
                            TaskEvent::Finished(TaskOutcome::Cancelled),
                            RunnerState::Finished,
                        ));
                    }
                    match spawn(&program, &args) {
                        Ok(child) => next_event(Box::new(Running::new(child, cancel))).await,
                        Err(e) => Some((
                            TaskEvent::Finished(TaskOutcome::Failed(e)),
                            RunnerState::Finished,
                        )),
                    }
                }
                RunnerState::Running(run) => next_event(run).await,
                RunnerState::Finished => None,
            }
        },
    )
    .boxed()
}

enum RunnerState {
    Start {
        program: OsString,
        args: Vec<String>,
        cancel: CancellationToken,
    },
    Running(Box<Running>),
    Finished,
}

struct Running {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<BufReader<ChildStderr>>,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
    pending: VecDeque<String>,
    tracker: ProgressTracker,
    cancel: CancellationToken,
}

enum Read {
    Chunk(Vec<u8>),
    Progressed,
    Closed,
    Cancelled,
}

fn spawn(program: &OsString, args: &[String]) -> Result<Child, TaskError> {
    log::info!(
        "spawning {} {}",
        program.to_string_lossy(),
        shell_words::join(args)
    );
    hidden_command(program)
        .args(args)
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                TaskError::ExecutableNotFound(program.to_string_lossy().into_owned())
            }
            _ => TaskError::Io(format!("Failed to start {}: {e}", program.to_string_lossy())),
        })
}

impl Running {
    fn new(mut child: Child, cancel: CancellationToken) -> Self {
        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = child.stderr.take().map(BufReader::new);
        Self {
            child,
            stdout,
            stderr,
            stdout_buf: Vec::new(),
            stderr_buf: Vec::new(),
            pending: VecDeque::new(),
            tracker: ProgressTracker::default(),
            cancel,
        }
    }

    /// Wait for the next completed line on either pipe.
    ///
    /// A segment ends at `\r` or `\n`. Text left without a terminator is
    /// flushed once the pipe has been idle for [`PARTIAL_LINE_FLUSH`].
    async fn read(&mut self) -> io::Result<Read> {
        let Running {
            stdout,
            stderr,
            stdout_buf,
            stderr_buf,
            cancel,
            ..
        } = self;

        if stdout.is_none() && stderr.is_none() {
            return Ok(Read::Closed);
        }

        let partial = !stdout_buf.is_empty() || !stderr_buf.is_empty();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Read::Cancelled),
            n = read_segment(stdout, stdout_buf), if stdout.is_some() => {
                Ok(take_segment(n?, stdout, stdout_buf))
            }
            n = read_segment(stderr, stderr_buf), if stderr.is_some() => {
                Ok(take_segment(n?, stderr, stderr_buf))
            }
            _ = tokio::time::sleep(PARTIAL_LINE_FLUSH), if partial => {
                let mut chunk = std::mem::take(stdout_buf);
                chunk.push(b'\n');
                chunk.append(stderr_buf);
                Ok(Read::Chunk(chunk))
            }
        }
    }

    fn queue_lines(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        self.pending.extend(
            text.split(['\r', '\n'])
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
}

/// Move whatever the reader has buffered into `buf`, stopping after the
/// first `\r` or `\n`. Returns the number of bytes moved; zero means EOF.
async fn read_segment<R: AsyncBufRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut Vec<u8>,
) -> io::Result<usize> {
    let Some(reader) = reader else {
        return std::future::pending().await;
    };
    let available = reader.fill_buf().await?;
    let used = match available.iter().position(|b| matches!(b, b'\r' | b'\n')) {
        Some(end) => end + 1,
        None => available.len(),
    };
    buf.extend_from_slice(&available[..used]);
    reader.consume(used);
    Ok(used)
}

fn take_segment<R>(n: usize, reader: &mut Option<R>, buf: &mut Vec<u8>) -> Read {
    if n == 0 {
        *reader = None;
        if buf.is_empty() {
            return Read::Progressed;
        }
    } else if !matches!(buf.last(), Some(b'\r' | b'\n')) {
        return Read::Progressed;
    }
    Read::Chunk(std::mem::take(buf))
}

async fn next_event(mut run: Box<Running>) -> Option<(TaskEvent, RunnerState)> {
    loop {
        if run.cancel.is_cancelled() {
            return Some((terminate(run).await, RunnerState::Finished));
        }

        if let Some(text) = run.pending.pop_front() {
            let percent = run.tracker.observe(&text);
            log::debug!("{text}");
            return Some((
                TaskEvent::Output(OutputLine { text, percent }),
                RunnerState::Running(run),
            ));
        }

        match run.read().await {
            Ok(Read::Chunk(chunk)) => run.queue_lines(&chunk),
            Ok(Read::Progressed) | Ok(Read::Cancelled) => {}
            Ok(Read::Closed) => {
                return Some((
                    TaskEvent::Finished(finish(&mut run.child).await),
                    RunnerState::Finished,
                ));
            }
            Err(e) => {
                log::warn!("failed to read process output: {e}");
                if let Err(e) = shutdown_child(&mut run.child).await {
                    log::warn!("failed to stop process: {e}");
                }
                return Some((
                    TaskEvent::Finished(TaskOutcome::Failed(TaskError::Io(format!(
                        "Failed to read process output: {e}"
                    )))),
                    RunnerState::Finished,
                ));
            }
        }
    }
}

async fn finish(child: &mut Child) -> TaskOutcome {
    match child.wait().await {
        Ok(status) if status.success() => {
            log::info!("process exited successfully");
            TaskOutcome::Succeeded("Download completed successfully!".to_string())
        }
        Ok(status) => {
            log::warn!("process failed with {status}");
            TaskOutcome::Failed(TaskError::NonZeroExit(status.to_string()))
        }
        Err(e) => TaskOutcome::Failed(TaskError::Io(format!(
            "Failed to wait for process: {e}"
        ))),
    }
}

async fn terminate(mut run: Box<Running>) -> TaskEvent {
    log::info!("cancelling running process");
    // Close our ends first so a child blocked on a full pipe can exit.
    run.stdout = None;
    run.stderr = None;
    if let Err(e) = shutdown_child(&mut run.child).await {
        log::warn!("failed to stop process: {e}");
    }
    TaskEvent::Finished(TaskOutcome::Cancelled)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn collect(args: &[&str], cancel: CancellationToken) -> Vec<TaskEvent> {
        run_process("sh", args.iter().map(|s| s.to_string()).collect(), cancel)
            .collect()
            .await
    }

    fn lines(events: &[TaskEvent]) -> Vec<(String, Option<u8>)> {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Output(line) => Some((line.text.clone(), line.percent)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_success_on_zero_exit() {
        let events = collect(
            &["-c", "echo '[download]  42.0% of 10.00MiB at 1.2MiB/s'; echo '   '; echo done"],
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            lines(&events),
            vec![
                (
                    "[download]  42.0% of 10.00MiB at 1.2MiB/s".to_string(),
                    Some(42)
                ),
                ("done".to_string(), Some(42)),
            ]
        );
        assert!(matches!(
            events.last(),
            Some(TaskEvent::Finished(TaskOutcome::Succeeded(_)))
        ));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_status() {
        let events = collect(
            &["-c", "echo out; echo err 1>&2; exit 3"],
            CancellationToken::new(),
        )
        .await;

        let texts: Vec<String> = lines(&events).into_iter().map(|(t, _)| t).collect();
        assert!(texts.contains(&"out".to_string()));
        assert!(texts.contains(&"err".to_string()));
        match events.last() {
            Some(TaskEvent::Finished(TaskOutcome::Failed(TaskError::NonZeroExit(status)))) => {
                assert!(status.contains('3'), "{status}");
            }
            other => panic!("unexpected final event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_carriage_returns_split_lines() {
        let events = collect(
            &["-c", r"printf '[download]  10.0%%\r[download]  55.5%%\rMerging\n'"],
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            lines(&events),
            vec![
                ("[download]  10.0%".to_string(), Some(10)),
                ("[download]  55.5%".to_string(), Some(55)),
                ("Merging".to_string(), Some(55)),
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_redraw_arrives_before_newline() {
        let mut stream = run_process(
            "sh",
            vec![
                "-c".into(),
                r"printf '\r[download]  10.0%%'; sleep 3; printf '\r[download] 100.0%%\n'".into(),
            ],
            CancellationToken::new(),
        );

        let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("redraw was held back until the newline");
        assert_eq!(
            first,
            Some(TaskEvent::Output(OutputLine {
                text: "[download]  10.0%".to_string(),
                percent: Some(10),
            }))
        );

        let rest: Vec<TaskEvent> = stream.collect().await;
        assert_eq!(
            lines(&rest),
            vec![("[download] 100.0%".to_string(), Some(100))]
        );
        assert!(matches!(
            rest.last(),
            Some(TaskEvent::Finished(TaskOutcome::Succeeded(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_executable_is_distinct() {
        let events: Vec<TaskEvent> = run_process(
            "definitely-not-a-real-binary-4711",
            vec![],
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            TaskEvent::Finished(TaskOutcome::Failed(TaskError::ExecutableNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_start_spawns_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch '{}'", marker.display());

        let events = collect(&["-c", &script], cancel).await;

        assert_eq!(events, vec![TaskEvent::Finished(TaskOutcome::Cancelled)]);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_stops_child() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let cancel = CancellationToken::new();
        let mut stream = run_process(
            "sh",
            vec![
                "-c".into(),
                "echo $$; echo '[download]   5.0%'; exec sleep 30".into(),
            ],
            cancel.clone(),
        );

        let pid = match stream.next().await {
            Some(TaskEvent::Output(line)) => line.text.parse::<i32>().unwrap(),
            other => panic!("expected pid line, got {other:?}"),
        };
        assert!(matches!(stream.next().await, Some(TaskEvent::Output(_))));

        cancel.cancel();
        assert_eq!(
            stream.next().await,
            Some(TaskEvent::Finished(TaskOutcome::Cancelled))
        );
        assert!(stream.next().await.is_none());
        assert!(kill(Pid::from_raw(pid), None::<Signal>).is_err());
    }
}
