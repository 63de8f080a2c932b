//! Conversion pipeline - one attempt at converting one job
//!
//! read input -> upload -> render as PDF -> write output -> delete remote copy

use crate::observability::Metrics;
use crate::queue::ConversionJob;
use crate::remote::{RemoteConverter, RemoteError, RenderFormat};
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on size polls while waiting for an input to settle
const MAX_SETTLE_POLLS: u32 = 20;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Upload failed: {0}")]
    Upload(#[source] RemoteError),

    #[error("Conversion failed: {0}")]
    Conversion(#[source] RemoteError),

    #[error("Cleanup failed: {0}")]
    Cleanup(#[source] RemoteError),
}

impl JobError {
    fn io(path: &Path, source: io::Error) -> Self {
        JobError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

/// An uploaded copy of a job's input, alive for one attempt
#[derive(Debug, Clone)]
pub struct RemoteArtifact {
    pub remote_id: String,
    pub source: ConversionJob,
}

/// Runs the per-job steps against a shared remote converter
pub struct Pipeline {
    remote: Arc<dyn RemoteConverter>,
    metrics: Arc<Metrics>,
    settle: Duration,
    uploads: AtomicU64,
}

impl Pipeline {
    pub fn new(remote: Arc<dyn RemoteConverter>, metrics: Arc<Metrics>) -> Self {
        Self {
            remote,
            metrics,
            settle: Duration::ZERO,
            uploads: AtomicU64::new(0),
        }
    }

    /// Wait for the input size to stop changing before reading it
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Convert one job, returning the number of PDF bytes written
    ///
    /// Once the upload succeeded the remote copy is deleted whatever happens
    /// next; a failed delete is logged and does not fail the attempt.
    pub async fn run(&self, job: &ConversionJob) -> Result<usize> {
        if !self.settle.is_zero() {
            wait_for_settle(job.input(), self.settle).await?;
        }

        // Step 1: Read input
        let content = tokio::fs::read(job.input())
            .await
            .map_err(|e| JobError::io(job.input(), e))?;

        let name = job.file_name().ok_or_else(|| {
            JobError::io(
                job.input(),
                io::Error::new(io::ErrorKind::InvalidInput, "input has no file name"),
            )
        })?;

        // Step 2: Upload
        let remote_name = self.remote_name(&name);
        let remote_id = self
            .remote
            .upload(&remote_name, Bytes::from(content))
            .await
            .map_err(JobError::Upload)?;

        let artifact = RemoteArtifact {
            remote_id,
            source: job.clone(),
        };

        // Steps 3-4: Render and write
        let outcome = self.render_to_output(&artifact).await;

        // Step 5: Cleanup, regardless of outcome
        self.cleanup(&artifact).await;

        outcome
    }

    /// Name of the uploaded copy, unique per attempt
    ///
    /// Jobs for the same file name may be in flight together, and each must
    /// own its remote item. The original name stays last so the extension
    /// still drives the remote conversion.
    fn remote_name(&self, file_name: &str) -> String {
        let n = self.uploads.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", std::process::id(), n, file_name)
    }

    async fn render_to_output(&self, artifact: &RemoteArtifact) -> Result<usize> {
        let pdf = self
            .remote
            .render(&artifact.remote_id, RenderFormat::Pdf)
            .await
            .map_err(JobError::Conversion)?;

        let output = artifact.source.output();
        if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| JobError::io(dir, e))?;
        }

        tokio::fs::write(output, &pdf)
            .await
            .map_err(|e| JobError::io(output, e))?;

        info!(
            remote_id = %artifact.remote_id,
            output = %output.display(),
            size = pdf.len(),
            "PDF written"
        );

        Ok(pdf.len())
    }

    async fn cleanup(&self, artifact: &RemoteArtifact) {
        if let Err(e) = self.remote.delete(&artifact.remote_id).await {
            let error = JobError::Cleanup(e);
            self.metrics.cleanup_failed();
            warn!(
                remote_id = %artifact.remote_id,
                job = %artifact.source,
                error = %error,
                "Remote copy not deleted"
            );
        }
    }
}

/// Poll the file size until two reads `interval` apart agree
async fn wait_for_settle(path: &Path, interval: Duration) -> Result<()> {
    let mut last = file_len(path).await?;

    for _ in 0..MAX_SETTLE_POLLS {
        tokio::time::sleep(interval).await;
        let current = file_len(path).await?;
        if current == last {
            return Ok(());
        }
        debug!(path = %path.display(), size = current, "Input still growing");
        last = current;
    }

    debug!(path = %path.display(), "Input did not settle, reading anyway");
    Ok(())
}

async fn file_len(path: &Path) -> Result<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .map_err(|e| JobError::io(path, e))
}
