//! External command orchestration.
//!
//! Every toolchain invocation in the pipeline goes through [`run`] with a
//! [`CommandSpec`] value object, so environment, working directory, and
//! timeout are explicit at the call site and the runner owns spawn, I/O
//! capture, and teardown.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::{CoreError, CoreResult};

/// Maximum bytes captured per output stream. Gradle in particular can be
/// extremely chatty; anything beyond this is truncated.
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Tail kept when summarizing a failed command's stderr.
const SUMMARY_MAX_LINES: usize = 12;
const SUMMARY_MAX_CHARS: usize = 2000;

/// A fully-described external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Rendered command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Tail of stderr (falling back to stdout) for error reporting.
    pub fn error_summary(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().collect();
        let start = lines.len().saturating_sub(SUMMARY_MAX_LINES);
        let mut tail = lines[start..].join("\n").trim().to_string();
        if tail.len() > SUMMARY_MAX_CHARS {
            let mut cut = tail.len() - SUMMARY_MAX_CHARS;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail = format!("…{}", &tail[cut..]);
        }
        tail
    }
}

/// Spawn the command, capture both streams, and wait for exit.
///
/// A missing binary surfaces as [`CoreError::Environment`]; a timeout kills
/// the child (`kill_on_drop`) and surfaces as [`CoreError::Toolchain`].
/// Non-zero exits are *not* an error here; use [`run_checked`] for that.
pub async fn run(spec: &CommandSpec) -> CoreResult<CommandOutput> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::Environment(format!("'{}' not found on PATH", spec.program))
        } else {
            CoreError::Io(e)
        }
    })?;

    // Read both streams in spawned tasks so `child.wait()` stays available.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let status = match spec.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(waited) => waited?,
            Err(_elapsed) => {
                // Dropping `child` kills the process via kill_on_drop.
                return Err(CoreError::Toolchain(format!(
                    "'{}' timed out after {}s",
                    spec.display(),
                    timeout.as_secs()
                )));
            }
        },
        None => child.wait().await?,
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration: start.elapsed(),
    })
}

/// Like [`run`], but a non-zero exit becomes a [`CoreError::Toolchain`]
/// carrying the command line and an stderr summary.
pub async fn run_checked(spec: &CommandSpec) -> CoreResult<CommandOutput> {
    let output = run(spec).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(CoreError::Toolchain(format!(
            "'{}' exited with code {}: {}",
            spec.display(),
            output.exit_code,
            output.error_summary()
        )))
    }
}

/// Whether `program --version` runs successfully; used for availability
/// probes (pnpm/yarn/cordova/gradle).
pub async fn is_available(program: &str) -> bool {
    let spec = CommandSpec::new(program)
        .arg("--version")
        .timeout(Duration::from_secs(15));
    matches!(run(&spec).await, Ok(out) if out.success())
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = handle {
        let _ = (&mut stream)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let spec = CommandSpec::new("sh").args(["-c", "echo hello"]);
        let out = run(&spec).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error_for_run() {
        let spec = CommandSpec::new("sh").args(["-c", "echo oops >&2; exit 3"]);
        let out = run(&spec).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn run_checked_reports_the_stderr_tail() {
        let spec = CommandSpec::new("sh").args(["-c", "echo gradle exited 1 >&2; exit 1"]);
        let err = run_checked(&spec).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exited with code 1"), "{message}");
        assert!(message.contains("gradle exited 1"), "{message}");
    }

    #[tokio::test]
    async fn missing_binary_is_an_environment_error() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-4913");
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, CoreError::Environment(_)));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "sleep 30"])
            .timeout(Duration::from_millis(100));
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, CoreError::Toolchain(_)), "{err}");
    }

    #[tokio::test]
    async fn applies_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $DEMO_VAR; pwd"])
            .env("DEMO_VAR", "42")
            .current_dir(dir.path());
        let out = run(&spec).await.unwrap();
        assert!(out.stdout.starts_with("42\n"));
    }

    #[test]
    fn error_summary_keeps_the_tail() {
        let noisy: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let out = CommandOutput {
            stdout: String::new(),
            stderr: noisy,
            exit_code: 1,
            duration: Duration::from_secs(1),
        };
        let summary = out.error_summary();
        assert!(summary.contains("line 99"));
        assert!(!summary.contains("line 10\n"));
    }
}
