//! Where job results go: output publishing and status notification.

use std::path::{Path, PathBuf};

use cadence_common::error::{CadenceError, CadenceResult};
use cadence_timeline_model::job::{JobOutcome, ProgressUpdate, StorageConfig};

/// Receives progress and completion events for a job.
#[async_trait::async_trait]
pub trait JobNotifier: Send + Sync {
    async fn progress(&self, callback_url: Option<&str>, update: &ProgressUpdate) -> CadenceResult<()>;

    async fn completed(&self, callback_url: Option<&str>, outcome: &JobOutcome) -> CadenceResult<()>;
}

/// Notifier that writes every event to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl JobNotifier for TracingNotifier {
    async fn progress(&self, callback_url: Option<&str>, update: &ProgressUpdate) -> CadenceResult<()> {
        let payload = serde_json::to_string(update)?;
        tracing::info!(
            job_id = %update.job_id,
            callback_url = callback_url.unwrap_or("-"),
            %payload,
            "Job progress"
        );
        Ok(())
    }

    async fn completed(&self, callback_url: Option<&str>, outcome: &JobOutcome) -> CadenceResult<()> {
        let payload = serde_json::to_string(outcome)?;
        if outcome.is_success() {
            tracing::info!(
                job_id = %outcome.job_id,
                callback_url = callback_url.unwrap_or("-"),
                %payload,
                "Job completed"
            );
        } else {
            tracing::error!(
                job_id = %outcome.job_id,
                callback_url = callback_url.unwrap_or("-"),
                %payload,
                "Job failed"
            );
        }
        Ok(())
    }
}

/// Moves a rendered file to durable storage and returns its locator.
#[async_trait::async_trait]
pub trait OutputPublisher: Send + Sync {
    async fn publish(&self, local: &Path, storage: &StorageConfig, job_id: &str) -> CadenceResult<String>;
}

/// Publisher that copies into `<root>/<bucket>/<key>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirectoryPublisher {
    root: PathBuf,
}

impl LocalDirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn destination(&self, storage: &StorageConfig, job_id: &str) -> CadenceResult<PathBuf> {
        let key = storage.key_for(job_id);
        let relative = Path::new(&storage.output_bucket).join(&key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if storage.output_bucket.is_empty() || key.is_empty() || escapes {
            return Err(CadenceError::invalid_argument(format!(
                "storage location '{}/{}' is not a relative path",
                storage.output_bucket, key
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl OutputPublisher for LocalDirectoryPublisher {
    async fn publish(&self, local: &Path, storage: &StorageConfig, job_id: &str) -> CadenceResult<String> {
        let destination = self.destination(storage, job_id)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(local, &destination).await?;
        tracing::info!(
            from = %local.display(),
            to = %destination.display(),
            bytes,
            "Published output"
        );
        Ok(destination.to_string_lossy().into_owned())
    }
}
