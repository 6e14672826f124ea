//! External command execution.
//!
//! Programs are always invoked with an explicit argument vector (no shell),
//! with stdout and stderr captured so failures can carry the tool's own
//! diagnostics. An optional timeout kills a child that never exits, along
//! with anything it started.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

/// How often a child with a deadline is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// stderr followed by stdout, for error reports.
    pub fn diagnostics(&self) -> String {
        match (self.stderr_trimmed(), self.stdout_trimmed()) {
            ("", out) => out.to_string(),
            (err, "") => err.to_string(),
            (err, out) => format!("{}\n{}", err, out),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to execute '{program}'. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{prefix} (exit code {code})")]
    Failed {
        prefix: String,
        code: i32,
        result: CommandResult,
    },

    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
    },
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Run in `dir` instead of the caller's working directory.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Kill the child if it runs longer than `timeout`. `None` waits forever.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// The argument vector as it will be passed to the program.
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult, ProcessError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        // A timed child leads its own process group so the kill reaches
        // grandchildren (grub-mkrescue runs xorriso).
        if self.timeout.is_some() {
            own_process_group(&mut cmd);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let status = match self.timeout {
            None => child.wait(),
            Some(timeout) => match wait_with_deadline(&mut child, timeout) {
                Ok(Some(status)) => Ok(status),
                Ok(None) => {
                    // Reader threads are detached: a grandchild that
                    // escaped the group may still hold the pipes open.
                    kill_group(&mut child);
                    let _ = child.wait();
                    return Err(ProcessError::TimedOut {
                        program: self.program.clone(),
                        timeout,
                    });
                }
                Err(e) => Err(e),
            },
        }
        .map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let result = CommandResult {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        };

        if !result.success() {
            let prefix = self
                .error_prefix
                .unwrap_or_else(|| format!("'{}' failed", self.program));
            return Err(ProcessError::Failed {
                prefix,
                code: result.code(),
                result,
            });
        }

        Ok(result)
    }
}

/// Poll `child` until it exits or `timeout` elapses. `Ok(None)` means expired.
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// SIGKILL everything in the child's process group, then the child.
#[cfg(unix)]
fn kill_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a stale group just yields ESRCH.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Resolve a program name (or explicit path) to an executable on `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}
