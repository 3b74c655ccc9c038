//! Invokes an external VCS executable for anything touching credentials,
//! large-file filters, or remote transport.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use archon_core::{codes, ArchonError};

const MAX_CAPTURED_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub(crate) fn into_result(self, verb: &str) -> Result<Self, ArchonError> {
        if self.success {
            Ok(self)
        } else {
            Err(ArchonError::new(
                codes::GIT_COMMAND_FAILED,
                format!("git {verb} failed: {}", self.stderr.trim()),
            ))
        }
    }
}

/// Runs `git` (or another configured VCS binary) as a child process in
/// `repo_path`, with a bounded timeout and bounded output capture.
#[derive(Debug, Clone)]
pub struct PorcelainExecutor {
    binary: PathBuf,
    repo_path: PathBuf,
    timeout: Duration,
}

impl PorcelainExecutor {
    #[must_use]
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("git"),
            repo_path: repo_path.into(),
            timeout: Duration::from_secs(5 * 60),
        }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Confirms the configured binary can be located and invoked at all.
    /// A missing executable surfaces as `E_GIT_MISSING` everywhere a write
    /// path needs it.
    pub fn check_available(&self) -> Result<(), ArchonError> {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|_| {
                ArchonError::new(
                    codes::GIT_MISSING,
                    format!("{} executable not found on PATH", self.binary.display()),
                )
            })
            .map(|_| ())
    }

    pub fn run(&self, args: &[&str]) -> Result<CommandOutput, ArchonError> {
        self.run_in(&self.repo_path, args)
    }

    pub fn run_in(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, ArchonError> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ArchonError::new(
                        codes::GIT_MISSING,
                        format!("{} executable not found on PATH", self.binary.display()),
                    )
                } else {
                    ArchonError::io(format!("spawn `git {}`", args.join(" ")), &e)
                }
            })?;

        let mut stdout_handle = child.stdout.take().expect("piped stdout");
        let mut stderr_handle = child.stderr.take().expect("piped stderr");
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_handle.by_ref().take(MAX_CAPTURED_BYTES as u64).read_to_end(&mut buf);
            let _ = stdout_tx.send(buf);
        });
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_handle.by_ref().take(MAX_CAPTURED_BYTES as u64).read_to_end(&mut buf);
            let _ = stderr_tx.send(buf);
        });

        let status = wait_with_timeout(&mut child, self.timeout).map_err(|timed_out| {
            let _ = child.kill();
            let _ = child.wait();
            if timed_out {
                ArchonError::new(
                    codes::TIMEOUT,
                    format!("git {} timed out after {:?}", args.join(" "), self.timeout),
                )
            } else {
                ArchonError::new(codes::GIT_COMMAND_FAILED, format!("failed to wait on git {}", args.join(" ")))
            }
        })?;

        let stdout = stdout_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default();
        let stderr = stderr_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default();

        Ok(CommandOutput {
            success: status.success(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }
}

/// Polls `child` until it exits or `timeout` elapses. `Err(true)` means the
/// timeout fired; `Err(false)` means the underlying `try_wait` call failed.
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus, bool> {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if std::time::Instant::now() >= deadline {
                    return Err(true);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return Err(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_reports_git_missing() {
        let executor = PorcelainExecutor::new(".").with_binary("archon-does-not-exist-binary");
        let err = executor.check_available().unwrap_err();
        assert_eq!(err.code(), codes::GIT_MISSING);
    }
}
