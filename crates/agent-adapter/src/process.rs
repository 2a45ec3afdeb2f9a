//! Agent process management
//!
//! Two invocation modes over the backend CLIs: a blocking one-shot mode
//! that captures output to completion, and a cancellable mode that polls
//! the child and honors a shared cancellation flag with SIGTERM-then-kill
//! escalation.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};

/// How often the cancellable mode checks for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period between requesting termination and force-killing
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Shared cancellation flag checked by the poll loop.
///
/// Clones observe the same flag, so a caller can keep one clone and hand
/// the other to `run_cancellable`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation; observed within one poll interval
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer invoked with the child's pid right after spawn
pub type SpawnObserver = Box<dyn FnMut(u32) + Send>;

/// Fully-specified backend invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Executable name, resolved via PATH
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child
    pub cwd: PathBuf,
    /// Additional environment variables
    pub env: Vec<(String, String)>,
    /// Payload written once to the child's stdin
    pub stdin_payload: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            stdin_payload: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_payload(mut self, payload: impl Into<String>) -> Self {
        self.stdin_payload = Some(payload.into());
        self
    }
}

/// Captured outcome of a completed child process
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    cmd
}

fn spawn(spec: &CommandSpec) -> Result<Child> {
    info!(
        "Spawning {} {:?} in {:?}",
        spec.program, spec.args, spec.cwd
    );

    build_command(spec).spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AdapterError::command_not_found(&spec.program)
        } else {
            AdapterError::Io(e)
        }
    })
}

/// Write the prompt from its own task.
///
/// The write must not run inline: a child that never reads stdin would
/// block `write_all` past the pipe buffer and stall the caller, so the
/// writer runs concurrently with stream draining and the wait loop.
/// Dropping stdin at the end closes the pipe so the child sees EOF.
fn feed_stdin(child: &mut Child, payload: Option<String>) -> Option<JoinHandle<()>> {
    let mut stdin = child.stdin.take()?;

    Some(tokio::spawn(async move {
        if let Some(payload) = payload {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                warn!("Failed to write prompt to stdin: {}", e);
            }
        }
    }))
}

fn drain_stream<R>(reader: Option<R>) -> JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Run a backend to completion with no cancellation support.
///
/// Used for one-shot calls like agent listing.
pub async fn run_to_completion(mut spec: CommandSpec) -> Result<CommandOutput> {
    let mut child = spawn(&spec)?;
    let _stdin_handle = feed_stdin(&mut child, spec.stdin_payload.take());

    let output = child.wait_with_output().await?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a backend with cooperative cancellation.
///
/// Checks the flag before spawning (an already-signaled flag returns
/// `Cancelled` without starting a process), hands the pid to the optional
/// observer, then polls completion on a 100ms interval. The prompt write
/// and the stream drains run as concurrent tasks, so cancellation is
/// observed even while the prompt is still pending against a child that
/// never reads stdin. Observed cancellation requests graceful
/// termination, waits about a second, then force-kills; partial output is
/// discarded.
pub async fn run_cancellable(
    mut spec: CommandSpec,
    cancel: &CancelFlag,
    mut on_spawn: Option<SpawnObserver>,
) -> Result<CommandOutput> {
    if cancel.is_cancelled() {
        debug!("Cancellation observed before spawn, skipping {}", spec.program);
        return Err(AdapterError::Cancelled);
    }

    let mut child = spawn(&spec)?;

    if let (Some(pid), Some(observer)) = (child.id(), on_spawn.as_mut()) {
        observer(pid);
    }

    let stdin_handle = feed_stdin(&mut child, spec.stdin_payload.take());
    let stdout_handle = drain_stream(child.stdout.take());
    let stderr_handle = drain_stream(child.stderr.take());

    let status = loop {
        match tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
            Ok(status) => break status?,
            Err(_) => {
                if cancel.is_cancelled() {
                    info!("Cancellation observed, terminating {}", spec.program);
                    terminate(&mut child).await;
                    if let Some(handle) = &stdin_handle {
                        handle.abort();
                    }
                    return Err(AdapterError::Cancelled);
                }
            }
        }
    };

    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr = stderr_handle.await.unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// Graceful termination with escalation to a hard kill
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid came from a live child we own
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        warn!("Process ignored termination request, killing");
        let _ = child.kill().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", std::env::temp_dir()).args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_to_completion_captures_streams() {
        let out = run_to_completion(sh("printf out; printf err >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "out");
        assert_eq!(out.stderr, "err");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_stdin_payload_is_delivered() {
        let spec = CommandSpec::new("cat", std::env::temp_dir()).stdin_payload("hello agent");
        let out = run_to_completion(spec).await.unwrap();
        assert_eq!(out.stdout, "hello agent");
    }

    #[tokio::test]
    async fn test_missing_command_is_distinguished() {
        let spec = CommandSpec::new("definitely-not-a-real-cli-binary", std::env::temp_dir());
        let err = run_to_completion(spec).await.unwrap_err();
        assert!(matches!(err, AdapterError::CommandNotFound { .. }));
        assert!(err.to_string().contains("command not found"));
    }

    #[tokio::test]
    async fn test_pre_signaled_cancel_skips_spawn() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        // A nonexistent binary proves nothing was spawned: the error is
        // Cancelled, not CommandNotFound.
        let spec = CommandSpec::new("definitely-not-a-real-cli-binary", std::env::temp_dir());
        let err = run_cancellable(spec, &cancel, None).await.unwrap_err();
        assert!(matches!(err, AdapterError::Cancelled));
        assert_eq!(err.to_string(), "Agent request cancelled.");
    }

    #[tokio::test]
    async fn test_cancellation_observed_while_stdin_write_is_blocked() {
        // The child never reads stdin, so a payload larger than the pipe
        // buffer keeps the writer pending for the whole run. Cancellation
        // must still be observed on the poll interval.
        let cancel = CancelFlag::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let payload = "x".repeat(1 << 20);
        let spec = sh("sleep 30").stdin_payload(payload);

        let start = Instant::now();
        let err = run_cancellable(spec, &cancel, None).await.unwrap_err();
        assert!(matches!(err, AdapterError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_completion_with_mutual_pipe_pressure() {
        // The child fills its stdout pipe before touching stdin; with the
        // prompt written inline both sides would block forever.
        let payload = "x".repeat(1 << 20);
        let spec = sh("head -c 1048576 /dev/zero; cat > /dev/null").stdin_payload(payload);

        let out = run_to_completion(spec).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.len(), 1 << 20);
    }

    #[tokio::test]
    async fn test_cancellation_terminates_running_process() {
        let cancel = CancelFlag::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = run_cancellable(sh("sleep 30"), &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_observer_receives_pid() {
        let cancel = CancelFlag::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        let observer: SpawnObserver = Box::new(move |pid| {
            assert!(pid > 0);
            seen_clone.store(true, Ordering::SeqCst);
        });

        let out = run_cancellable(sh("true"), &cancel, Some(observer))
            .await
            .unwrap();
        assert!(out.success());
        assert!(seen.load(Ordering::SeqCst));
    }
}
