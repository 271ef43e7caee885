//! # Branch Archiver
//!
//! Produces a zip archive of a single branch straight from the git server,
//! using `git archive --remote` over ssh so no local clone is needed.
//!
//! The archive is returned as an [`ArchiveStream`]: the archive process's
//! stdout, joined with its exit status. The stream reports end-of-file only
//! after the process has exited successfully; a failed process surfaces as a
//! read error, so a truncated archive is never mistaken for a complete one.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    pin::Pin,
    process::Stdio,
    task::{ready, Context, Poll},
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf},
    process::{ChildStderr, Command},
};
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Errors
// ============================================================================

/// Failures of the remote archive operation
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Archive process did not expose its {pipe} pipe")]
    MissingPipe { pipe: &'static str },

    #[error("Failed to wait for archive process: {0}")]
    Wait(#[source] io::Error),

    #[error("git archive of '{branch}' from {remote} failed with {status}")]
    ProcessFailed {
        remote: String,
        branch: String,
        status: String,
    },
}

// ============================================================================
// Request
// ============================================================================

/// Everything needed to archive one branch
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// `user@host[:port]` of the git server
    pub git_authority: String,
    /// `<project>/<repository>`
    pub repository_path: String,
    pub branch: String,
    pub identity_file: PathBuf,
    pub known_hosts_file: PathBuf,
}

impl ArchiveRequest {
    /// `ssh://<authority>/<project>/<repository>.git`
    pub fn remote_url(&self) -> String {
        format!("ssh://{}/{}.git", self.git_authority, self.repository_path)
    }
}

// ============================================================================
// Archive Stream
// ============================================================================

type Completion = Pin<Box<dyn Future<Output = Result<(), ArchiveError>> + Send>>;

/// Single-pass archive bytes joined with the producer's completion status
///
/// Implements [`AsyncRead`]. When the underlying reader is exhausted the
/// completion future is awaited; only if it succeeds does the stream report
/// end-of-file. A failed completion is returned as an [`io::Error`] whose
/// inner error is the [`ArchiveError`].
pub struct ArchiveStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    completion: Option<Completion>,
}

impl ArchiveStream {
    pub fn new<R, F>(reader: R, completion: F) -> Self
    where
        R: AsyncRead + Send + 'static,
        F: Future<Output = Result<(), ArchiveError>> + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            completion: Some(Box::pin(completion)),
        }
    }

    /// A stream over bytes that are already complete
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(io::Cursor::new(bytes.into()), async { Ok(()) })
    }
}

impl AsyncRead for ArchiveStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let filled_before = buf.filled().len();
        ready!(this.reader.as_mut().poll_read(cx, buf))?;
        if buf.filled().len() > filled_before {
            return Poll::Ready(Ok(()));
        }

        // The reader is exhausted: end-of-file is only reported once the
        // producer has finished successfully.
        let Some(completion) = this.completion.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(completion.as_mut().poll(cx));
        this.completion = None;

        Poll::Ready(result.map_err(io::Error::other))
    }
}

impl fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveStream")
            .field("completed", &self.completion.is_none())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Interface Traits
// ============================================================================

/// Interface for producing branch archives
#[async_trait]
pub trait BranchArchiver: Send + Sync {
    /// Start archiving `request.branch` and return the archive bytes.
    ///
    /// Implementations may return before the archive has been produced;
    /// failures after this point are reported through the stream.
    async fn archive_branch(&self, request: &ArchiveRequest) -> Result<ArchiveStream, ArchiveError>;
}

// ============================================================================
// git archive implementation
// ============================================================================

/// Settings for [`GitArchiver`]
#[derive(Debug, Clone)]
pub struct GitArchiverSettings {
    /// git executable, looked up on `PATH` when not absolute
    pub git_program: PathBuf,
    /// zip compression level, 0 (store) to 9
    pub compression_level: u8,
}

impl Default for GitArchiverSettings {
    fn default() -> Self {
        Self {
            git_program: PathBuf::from("git"),
            compression_level: 0,
        }
    }
}

/// [`BranchArchiver`] that runs `git archive --remote` over ssh
#[derive(Debug, Clone, Default)]
pub struct GitArchiver {
    settings: GitArchiverSettings,
}

impl GitArchiver {
    pub fn new(settings: GitArchiverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GitArchiverSettings {
        &self.settings
    }

    fn build_command(&self, request: &ArchiveRequest) -> Command {
        let mut command = Command::new(&self.settings.git_program);
        command
            .arg("archive")
            .arg("--remote")
            .arg(request.remote_url())
            .arg("--format")
            .arg("zip")
            .arg(format!("-{}", self.settings.compression_level.min(9)))
            .arg(&request.branch)
            .env(
                "GIT_SSH_COMMAND",
                ssh_command(&request.identity_file, &request.known_hosts_file),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl BranchArchiver for GitArchiver {
    #[instrument(skip(self, request), fields(remote = %request.remote_url(), branch = %request.branch))]
    async fn archive_branch(&self, request: &ArchiveRequest) -> Result<ArchiveStream, ArchiveError> {
        let remote = request.remote_url();
        let branch = request.branch.clone();

        let mut child = self
            .build_command(request)
            .spawn()
            .map_err(|source| ArchiveError::Spawn {
                program: self.settings.git_program.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ArchiveError::MissingPipe { pipe: "stdout" })?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(log_stderr(stderr, remote.clone())));

        info!("Started git archive");

        let completion = async move {
            let status = child.wait().await.map_err(ArchiveError::Wait)?;
            if let Some(task) = stderr_task {
                // Stderr is diagnostic only.
                let _ = task.await;
            }

            if status.success() {
                debug!(remote = %remote, branch = %branch, "git archive finished");
                Ok(())
            } else {
                Err(ArchiveError::ProcessFailed {
                    remote,
                    branch,
                    status: status.to_string(),
                })
            }
        };

        Ok(ArchiveStream::new(stdout, completion))
    }
}

/// `GIT_SSH_COMMAND` pinning the identity and known-hosts files.
///
/// git runs the command through a shell, so the paths are single-quoted.
pub fn ssh_command(identity_file: &Path, known_hosts_file: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -o UserKnownHostsFile={} -o StrictHostKeyChecking=yes",
        shell_quote(&identity_file.display().to_string()),
        shell_quote(&known_hosts_file.display().to_string()),
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

async fn log_stderr(stderr: ChildStderr, remote: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(remote = %remote, "git archive: {}", line),
            Ok(None) => break,
            Err(e) => {
                warn!(remote = %remote, error = %e, "Failed to read git archive stderr");
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "archiver_tests.rs"]
mod tests;
