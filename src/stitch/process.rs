//! FFmpeg subprocess management for the stitching pipeline.
//!
//! This module handles spawning, monitoring, and terminating the decoder and
//! encoder processes.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a process gets to exit after SIGINT before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors that can occur while driving an FFmpeg process
#[derive(Debug)]
pub enum ProcessError {
    /// Executable not found on PATH
    NotFound(String),
    /// Failed to spawn the process
    SpawnFailed(std::io::Error),
    /// Process exited with non-zero status
    Failed { exit_code: Option<i32>, stderr: String },
    /// I/O error while talking to the process
    IoError(std::io::Error),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::NotFound(program) => {
                write!(
                    f,
                    "{} not found. Please install FFmpeg (e.g. brew install ffmpeg or apt install ffmpeg)",
                    program
                )
            }
            ProcessError::SpawnFailed(e) => write!(f, "Failed to spawn process: {}", e),
            ProcessError::Failed { exit_code, stderr } => {
                write!(f, "Process exited with code {:?}\n{}", exit_code, stderr)
            }
            ProcessError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<std::io::Error> for ProcessError {
    fn from(e: std::io::Error) -> Self {
        ProcessError::IoError(e)
    }
}

/// Which standard streams to pipe. stderr is always captured.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeSpec {
    pub stdin: bool,
    pub stdout: bool,
}

/// A running ffmpeg/ffprobe process.
pub struct FfmpegProcess {
    child: Child,
    label: &'static str,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
    exited: Option<ExitStatus>,
}

impl FfmpegProcess {
    /// Spawn `program` with `args`.
    ///
    /// stderr lines are logged at debug level under `label` and kept for
    /// error reports.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::NotFound` when the executable is missing.
    pub fn spawn<I, S>(
        program: &str,
        args: I,
        pipes: PipeSpec,
        label: &'static str,
    ) -> Result<Self, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if pipes.stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(if pipes.stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound(program.to_string())
            } else {
                ProcessError::SpawnFailed(e)
            }
        })?;

        let stderr = child.stderr.take();
        let stderr_thread = stderr.map(|stderr| {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            log::debug!("[{}] {}", label, l);
                            lines.push(l);
                        }
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        Ok(FfmpegProcess {
            child,
            label,
            stderr_thread,
            exited: None,
        })
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        if self.exited.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exited = Some(status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Wait for the process to complete and return the exit status.
    pub fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        if let Some(status) = self.exited {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.exited = Some(status);
        Ok(status)
    }

    /// Wait for the process and turn a non-zero exit into `ProcessError::Failed`.
    pub fn wait_success(&mut self) -> Result<(), ProcessError> {
        let status = self.wait()?;
        if status.success() {
            return Ok(());
        }
        let stderr = self.take_stderr_output().join("\n");
        Err(ProcessError::Failed {
            exit_code: status.code(),
            stderr,
        })
    }

    /// Request a graceful shutdown.
    ///
    /// Sends SIGINT and waits briefly; if the process doesn't exit in time it
    /// is killed.
    pub fn shutdown(&mut self) -> Result<ExitStatus, ProcessError> {
        if !self.is_running() {
            return self.wait();
        }

        log::debug!("Stopping {} (pid {})", self.label, self.child.id());

        #[cfg(unix)]
        {
            unsafe {
                let pid = self.child.id() as i32;
                libc::kill(pid, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let start = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.exited = Some(status);
                    return Ok(status);
                }
                Ok(None) => {
                    if start.elapsed() > SHUTDOWN_GRACE {
                        let _ = self.child.kill();
                        return self.wait();
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(ProcessError::IoError(e)),
            }
        }
    }

    /// Collected stderr output. Only complete once the process has exited.
    pub fn take_stderr_output(&mut self) -> Vec<String> {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}

/// Check whether `program -version` runs.
pub fn is_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
