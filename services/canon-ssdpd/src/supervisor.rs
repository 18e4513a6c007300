//! Process supervision.
//!
//! The supervisor starts an action process and hands its completion back to
//! the dispatcher as a message on the completion channel. Each successful
//! spawn yields exactly one [`Completion`]. Waiting on the child reaps it.
//!
//! There is no retry, no timeout, and no kill on shutdown: a running action
//! may outlive the daemon.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::SpawnError;

/// What to run for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub working_directory: &'a Path,
    pub argv: &'a [String],
    pub log_path: &'a Path,
}

/// A started process.
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    /// Resolves once the process has exited and been reaped.
    pub exit: BoxFuture<'static, io::Result<ExitStatus>>,
}

/// Process creation primitive.
pub trait Launcher: Send + Sync {
    /// Start a process without waiting for it.
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<LaunchedProcess, SpawnError>;
}

/// Completion of a spawned action.
#[derive(Debug)]
pub struct Completion {
    pub device_id: String,
    pub pid: Option<u32>,
    /// `None` when waiting on the process failed.
    pub status: Option<ExitStatus>,
}

/// Open `path` for appending, creating it with mode 0644.
fn open_log(path: &Path) -> Result<File, SpawnError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
        .map_err(|source| SpawnError::Log {
            path: path.to_path_buf(),
            source,
        })
}

/// Launches real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<LaunchedProcess, SpawnError> {
        let (program, args) = request.argv.split_first().ok_or(SpawnError::EmptyArgv)?;

        let stdout = open_log(request.log_path)?;
        let stderr = stdout.try_clone().map_err(|source| SpawnError::Log {
            path: request.log_path.to_path_buf(),
            source,
        })?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(request.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| SpawnError::Exec {
                program: program.clone(),
                source,
            })?;

        Ok(LaunchedProcess {
            pid: child.id(),
            exit: Box::pin(async move { child.wait().await }),
        })
    }
}

/// Starts action processes and reports their completion.
pub struct ProcessSupervisor {
    launcher: Arc<dyn Launcher>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn Launcher>, completions: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            launcher,
            completions,
        }
    }

    /// Start `argv` for `device_id` and return its pid.
    ///
    /// Must be called from within a tokio runtime. On success a waiter task
    /// sends one [`Completion`] when the process exits. On failure nothing is
    /// sent.
    pub fn spawn(
        &self,
        device_id: &str,
        working_directory: &Path,
        argv: &[String],
        log_path: &Path,
    ) -> Result<Option<u32>, SpawnError> {
        let process = self.launcher.launch(&LaunchRequest {
            working_directory,
            argv,
            log_path,
        })?;

        let pid = process.pid;
        info!(
            device_id = %device_id,
            pid = ?pid,
            cwd = %working_directory.display(),
            log = %log_path.display(),
            "Action started"
        );

        let completions = self.completions.clone();
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            let status = match process.exit.await {
                Ok(status) => {
                    info!(device_id = %device_id, pid = ?pid, status = %status, "Action exited");
                    Some(status)
                }
                Err(e) => {
                    warn!(device_id = %device_id, pid = ?pid, error = %e, "Failed to wait for action");
                    None
                }
            };
            if completions
                .send(Completion {
                    device_id,
                    pid,
                    status,
                })
                .is_err()
            {
                debug!("Dispatcher gone, dropping completion");
            }
        });

        Ok(pid)
    }
}

/// A launch observed by [`MockLauncher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub working_directory: PathBuf,
    pub argv: Vec<String>,
    pub log_path: PathBuf,
}

#[derive(Default)]
struct MockState {
    launches: Vec<LaunchRecord>,
    exits: Vec<Option<oneshot::Sender<ExitStatus>>>,
}

/// Launcher that records requests and lets the caller decide when each
/// "process" exits.
#[derive(Default)]
pub struct MockLauncher {
    state: Mutex<MockState>,
    fail_launches: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher whose every launch fails.
    pub fn failing() -> Self {
        Self {
            state: Mutex::default(),
            fail_launches: true,
        }
    }

    /// All launches so far, in order.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.lock().launches.clone()
    }

    /// Let launch number `index` exit with `status`. Returns false if that
    /// launch does not exist or has already exited.
    pub fn finish(&self, index: usize, status: ExitStatus) -> bool {
        let sender = self
            .lock()
            .exits
            .get_mut(index)
            .and_then(Option::take);
        match sender {
            Some(sender) => sender.send(status).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Launcher for MockLauncher {
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<LaunchedProcess, SpawnError> {
        if self.fail_launches {
            return Err(SpawnError::Exec {
                program: request.argv.first().cloned().unwrap_or_default(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock launcher configured to fail"),
            });
        }

        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        state.launches.push(LaunchRecord {
            working_directory: request.working_directory.to_path_buf(),
            argv: request.argv.to_vec(),
            log_path: request.log_path.to_path_buf(),
        });
        state.exits.push(Some(tx));
        let pid = u32::try_from(state.launches.len()).ok();

        Ok(LaunchedProcess {
            pid,
            exit: Box::pin(async move {
                rx.await
                    .map_err(|_| io::Error::other("mock process abandoned"))
            }),
        })
    }
}
