//! Job execution: a [`JobRequest`] in, a [`JobOutcome`] out.

use std::path::{Path, PathBuf};

use cadence_common::config::OutputConfig;
use cadence_common::error::{CadenceError, CadenceResult};
use cadence_timeline_model::job::{
    JobOutcome, JobRequest, OutputOverrides, ProgressStage, ProgressUpdate,
};

use crate::compositor::{ProgressCallback, RenderProgress};
use crate::delivery::{JobNotifier, OutputPublisher};
use crate::pipeline::{AssemblyInput, AssemblyPipeline};

/// Smallest render advance forwarded to the notifier.
const RENDER_REPORT_STEP: f64 = 0.1;

/// Runs requests through an [`AssemblyPipeline`] and reports on them.
pub struct JobRunner {
    pipeline: AssemblyPipeline,
    publisher: Box<dyn OutputPublisher>,
    notifier: Box<dyn JobNotifier>,
    work_dir: PathBuf,
    base_output: OutputConfig,
}

impl JobRunner {
    pub fn new(
        pipeline: AssemblyPipeline,
        publisher: Box<dyn OutputPublisher>,
        notifier: Box<dyn JobNotifier>,
        work_dir: impl Into<PathBuf>,
        base_output: OutputConfig,
    ) -> Self {
        Self {
            pipeline,
            publisher,
            notifier,
            work_dir: work_dir.into(),
            base_output,
        }
    }

    /// Run `request` to completion. Never fails; errors become a failed outcome.
    pub async fn run(&self, request: &JobRequest) -> JobOutcome {
        let job_dir = self.work_dir.join(sanitize_job_id(&request.job_id));
        tracing::info!(job_id = %request.job_id, dir = %job_dir.display(), "Starting job");

        let outcome = match self.execute(request, &job_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %request.job_id, error = %e, "Job failed");
                JobOutcome::failed(request.job_id.clone(), e.to_string())
            }
        };

        if let Err(e) = self
            .notifier
            .completed(request.callback_url.as_deref(), &outcome)
            .await
        {
            tracing::warn!(job_id = %request.job_id, error = %e, "Completion notification failed");
        }

        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %job_dir.display(), error = %e, "Failed to clean up job directory");
            }
        }
        outcome
    }

    async fn execute(&self, request: &JobRequest, job_dir: &Path) -> CadenceResult<JobOutcome> {
        self.notify(request, ProgressStage::Validating).await;
        validate_request(request).await?;

        self.notify(request, ProgressStage::Downloading).await;
        tokio::fs::create_dir_all(job_dir).await?;
        tracing::debug!(
            job_id = %request.job_id,
            segments = request.video_locators.len(),
            "Media is read in place from its locators"
        );

        self.notify(request, ProgressStage::Processing).await;
        let output = apply_overrides(&self.base_output, &request.output_config);
        let input = AssemblyInput {
            job_id: request.job_id.clone(),
            audio_locator: request.audio_locator.clone(),
            video_locators: request.video_locators.clone(),
            captions: request
                .captions_config
                .captions_for(&request.script_segments),
            effects: request.effects_config.clone(),
            output_path: job_dir.join(format!("output.{}", output.format.extension())),
            output,
        };
        let (renders, mut render_updates) = tokio::sync::mpsc::unbounded_channel::<RenderProgress>();
        let on_render: ProgressCallback = Box::new(move |report: RenderProgress| {
            let _ = renders.send(report);
        });
        // The callback, and with it the sender, drops when assembly ends.
        let forward = async {
            let mut reported = 0.0;
            while let Some(report) = render_updates.recv().await {
                let finished = report.fraction >= 1.0 && reported < 1.0;
                if finished || report.fraction >= reported + RENDER_REPORT_STEP {
                    reported = report.fraction;
                    let update = ProgressUpdate::within(
                        request.job_id.clone(),
                        ProgressStage::Processing,
                        report.fraction,
                    );
                    self.send_update(request, &update).await;
                }
            }
        };
        let (assembled, ()) = tokio::join!(
            self.pipeline.assemble_with_progress(&input, Some(on_render)),
            forward
        );
        let assembled = assembled?;

        self.notify(request, ProgressStage::Uploading).await;
        let locator = self
            .publisher
            .publish(&assembled.output_path, &request.storage_config, &request.job_id)
            .await?;

        Ok(JobOutcome::completed(
            request.job_id.clone(),
            locator,
            assembled.metadata,
        ))
    }

    async fn notify(&self, request: &JobRequest, stage: ProgressStage) {
        let update = ProgressUpdate::new(request.job_id.clone(), stage);
        self.send_update(request, &update).await;
    }

    async fn send_update(&self, request: &JobRequest, update: &ProgressUpdate) {
        if let Err(e) = self
            .notifier
            .progress(request.callback_url.as_deref(), update)
            .await
        {
            tracing::warn!(
                job_id = %request.job_id,
                stage = ?update.stage,
                progress = update.progress,
                error = %e,
                "Progress notification failed"
            );
        }
    }
}

/// Merge per-job overrides onto the configured output settings.
pub fn apply_overrides(base: &OutputConfig, overrides: &OutputOverrides) -> OutputConfig {
    OutputConfig {
        width: overrides.width.unwrap_or(base.width),
        height: overrides.height.unwrap_or(base.height),
        fps: overrides.fps.unwrap_or(base.fps),
        format: overrides.format.unwrap_or(base.format),
        bitrate: overrides
            .bitrate
            .clone()
            .unwrap_or_else(|| base.bitrate.clone()),
        audio_codec: base.audio_codec.clone(),
    }
}

async fn validate_request(request: &JobRequest) -> CadenceResult<()> {
    if request.job_id.trim().is_empty() {
        return Err(CadenceError::invalid_argument("job_id is empty"));
    }
    if request.audio_locator.trim().is_empty() {
        return Err(CadenceError::invalid_argument("audio locator is empty"));
    }
    if request.video_locators.is_empty() {
        return Err(CadenceError::invalid_argument(
            "at least one video locator is required",
        ));
    }

    let locators = std::iter::once(&request.audio_locator).chain(&request.video_locators);
    for locator in locators {
        if locator.contains("://") {
            continue;
        }
        if !tokio::fs::try_exists(locator).await? {
            return Err(CadenceError::FileNotFound {
                path: PathBuf::from(locator),
            });
        }
    }
    Ok(())
}

fn sanitize_job_id(job_id: &str) -> String {
    let cleaned: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::config::OutputFormat;
    use cadence_timeline_model::job::{CaptionsConfig, EffectsConfig, StorageConfig};

    fn request(audio: &str, videos: &[&str]) -> JobRequest {
        JobRequest {
            job_id: "job-1".to_string(),
            audio_locator: audio.to_string(),
            video_locators: videos.iter().map(|v| v.to_string()).collect(),
            script_segments: Vec::new(),
            effects_config: EffectsConfig::default(),
            captions_config: CaptionsConfig::default(),
            output_config: OutputOverrides::default(),
            callback_url: None,
            storage_config: StorageConfig::default(),
        }
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = OutputConfig::default();
        let merged = apply_overrides(
            &base,
            &OutputOverrides {
                width: Some(1280),
                height: Some(720),
                format: Some(OutputFormat::Webm),
                ..OutputOverrides::default()
            },
        );
        assert_eq!((merged.width, merged.height), (1280, 720));
        assert_eq!(merged.format, OutputFormat::Webm);
        assert_eq!(merged.fps, base.fps);
        assert_eq!(merged.bitrate, base.bitrate);
    }

    #[tokio::test]
    async fn test_remote_locators_skip_existence_check() {
        let req = request(
            "https://cdn.example.com/a.mp3",
            &["s3://bucket/v1.mp4", "https://cdn.example.com/v2.mp4"],
        );
        assert!(validate_request(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_local_file_is_reported() {
        let req = request("/nonexistent/cadence/narration.wav", &["https://x/v.mp4"]);
        assert!(matches!(
            validate_request(&req).await,
            Err(CadenceError::FileNotFound { .. })
        ));
        assert!(validate_request(&request("https://x/a.mp3", &[])).await.is_err());
    }

    #[tokio::test]
    async fn test_existing_local_file_passes_validation() {
        let path = std::env::temp_dir().join(format!("cadence-job-audio-{}.wav", std::process::id()));
        tokio::fs::write(&path, b"RIFF").await.unwrap();
        let req = request(path.to_str().unwrap(), &["https://x/v.mp4"]);
        assert!(validate_request(&req).await.is_ok());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn test_sanitize_job_id() {
        assert_eq!(sanitize_job_id("abc-123_x"), "abc-123_x");
        assert_eq!(sanitize_job_id("../../etc"), "______etc");
        assert_eq!(sanitize_job_id(""), "job");
    }
}
