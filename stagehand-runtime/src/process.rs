//! External process invocation.
//!
//! Every call to the container tooling is described by a [`ProcessSpec`] and
//! executed by a [`ProcessRunner`]. [`SystemRunner`] spawns real processes;
//! tests substitute a runner that records specs and replays canned outputs.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::RuntimeError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Inherit the terminal instead of capturing output.
    pub interactive: bool,
    /// Kill the process if it is still running after this long.
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            interactive: false,
            timeout: None,
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

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shell-like rendering for messages and logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit code plus captured output (empty for interactive runs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs.
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion. A non-zero exit is not an error here.
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, RuntimeError>;

    /// [`ProcessRunner::run`], turning a non-zero exit into
    /// [`RuntimeError::CommandFailed`].
    fn run_checked(&self, spec: &ProcessSpec) -> Result<ProcessOutput, RuntimeError> {
        let output = self.run(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                command: spec.command_line(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, RuntimeError> {
        (**self).run(spec)
    }
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for std::sync::Arc<R> {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, RuntimeError> {
        (**self).run(spec)
    }
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, RuntimeError> {
        tracing::debug!(command = %spec.command_line(), interactive = spec.interactive, "spawning");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        if spec.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let spawn_err = |source| RuntimeError::Spawn {
            program: spec.program.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;

        // Drain pipes on their own threads so a chatty child cannot block on
        // a full pipe while we poll for its exit.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match spec.timeout {
            Some(timeout) => wait_with_deadline(&mut child, timeout)
                .map_err(spawn_err)?
                .ok_or_else(|| RuntimeError::Timeout {
                    command: spec.command_line(),
                    after: timeout,
                })?,
            None => child.wait().map_err(spawn_err)?,
        };

        Ok(ProcessOutput {
            code: status.code(),
            stdout: stdout.map(join_drain).unwrap_or_default(),
            stderr: stderr.map(join_drain).unwrap_or_default(),
        })
    }
}

/// Poll `child` until it exits or `timeout` elapses. On expiry the child is
/// killed and reaped, and `None` is returned.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        thread::sleep(POLL_INTERVAL);
    }
    if let Some(status) = child.try_wait()? {
        return Ok(Some(status));
    }

    tracing::warn!(pid = child.id(), "process exceeded its timeout; killing");
    let _ = child.kill();
    let _ = child.wait();
    Ok(None)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = ProcessSpec::new("docker")
            .args(["compose", "-p", "shop"])
            .arg("ps");
        assert_eq!(spec.command_line(), "docker compose -p shop ps");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = SystemRunner
            .run(&ProcessSpec::new("stagehand-definitely-not-a-program"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }), "got {err}");
    }

    #[test]
    #[cfg(unix)]
    fn captures_stdout_and_exit_code() {
        let output = SystemRunner
            .run(&ProcessSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .expect("run");
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    #[cfg(unix)]
    fn run_checked_rejects_non_zero_exit() {
        let err = SystemRunner
            .run_checked(&ProcessSpec::new("sh").args(["-c", "echo bad >&2; exit 1"]))
            .unwrap_err();
        match err {
            RuntimeError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr.trim(), "bad");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn slow_process_is_killed_at_timeout() {
        let started = Instant::now();
        let err = SystemRunner
            .run(
                &ProcessSpec::new("sleep")
                    .arg("5")
                    .timeout(Duration::from_millis(200)),
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    #[cfg(unix)]
    fn fast_process_finishes_before_timeout() {
        let output = SystemRunner
            .run(&ProcessSpec::new("true").timeout(Duration::from_secs(5)))
            .expect("run");
        assert!(output.success());
    }
}
