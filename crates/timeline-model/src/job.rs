//! Assembly job contracts.
//!
//! A [`JobRequest`] is what a caller submits; [`ProgressUpdate`]s are emitted
//! while it runs and a single [`JobOutcome`] is produced at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_common::config::OutputFormat;

/// A scripted line of narration with its position in the audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// A caption to overlay on the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionsConfig {
    pub enabled: bool,

    /// Free-form styling passed through to the compositor.
    pub style: serde_json::Map<String, serde_json::Value>,
}

impl CaptionsConfig {
    /// Captions for `segments`, or none when captions are disabled.
    pub fn captions_for(&self, segments: &[ScriptSegment]) -> Vec<Caption> {
        if !self.enabled {
            return Vec::new();
        }
        segments
            .iter()
            .map(|s| Caption {
                text: s.text.clone(),
                start_time: s.start_time,
                end_time: s.end_time,
            })
            .collect()
    }
}

/// Requested visual effects. Accepted and forwarded; not rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    pub ken_burns: Option<serde_json::Value>,
    pub background_music: Option<serde_json::Value>,
}

impl EffectsConfig {
    pub fn is_empty(&self) -> bool {
        self.ken_burns.is_none() && self.background_music.is_none()
    }
}

/// Per-job overrides of the configured output encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub format: Option<OutputFormat>,
    pub bitrate: Option<String>,
}

/// Where the finished output is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_bucket: String,

    /// Object key. `{job_id}` is substituted.
    pub output_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_bucket: "cadence-videos".to_string(),
            output_key: "generated/{job_id}.mp4".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn key_for(&self, job_id: &str) -> String {
        self.output_key.replace("{job_id}", job_id)
    }
}

/// A complete assembly request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: String,

    /// Narration track. Its duration is authoritative.
    pub audio_locator: String,

    /// Video segments in output order.
    pub video_locators: Vec<String>,

    #[serde(default)]
    pub script_segments: Vec<ScriptSegment>,

    #[serde(default)]
    pub effects_config: EffectsConfig,

    #[serde(default)]
    pub captions_config: CaptionsConfig,

    #[serde(default)]
    pub output_config: OutputOverrides,

    #[serde(default)]
    pub callback_url: Option<String>,

    #[serde(default)]
    pub storage_config: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Validating,
    Downloading,
    Processing,
    Uploading,
}

impl ProgressStage {
    /// Fraction of the job completed when this stage begins.
    pub fn fraction(self) -> f64 {
        match self {
            ProgressStage::Validating => 0.1,
            ProgressStage::Downloading => 0.2,
            ProgressStage::Processing => 0.5,
            ProgressStage::Uploading => 0.8,
        }
    }

    /// Fraction of the job completed when this stage ends.
    pub fn end_fraction(self) -> f64 {
        match self {
            ProgressStage::Validating => ProgressStage::Downloading.fraction(),
            ProgressStage::Downloading => ProgressStage::Processing.fraction(),
            ProgressStage::Processing => ProgressStage::Uploading.fraction(),
            ProgressStage::Uploading => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: String,
    pub stage: ProgressStage,
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(job_id: impl Into<String>, stage: ProgressStage) -> Self {
        Self {
            job_id: job_id.into(),
            stage,
            progress: stage.fraction(),
            timestamp: Utc::now(),
        }
    }

    /// Update from part-way through `stage`; `done` is the share of the
    /// stage finished and is clamped to `[0, 1]`.
    pub fn within(job_id: impl Into<String>, stage: ProgressStage, done: f64) -> Self {
        let done = if done.is_finite() { done.clamp(0.0, 1.0) } else { 0.0 };
        let start = stage.fraction();
        Self {
            progress: start + (stage.end_fraction() - start) * done,
            ..Self::new(job_id, stage)
        }
    }
}

/// Facts about a finished assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub segment_count: usize,
    pub scene_durations: Vec<f64>,
    pub total_video_duration: f64,
    pub audio_duration: f64,

    /// Video and audio lengths agree within 0.1 s.
    pub duration_match: bool,
    pub resolution: String,
    pub fps: u32,
    pub codec: String,
    pub bitrate: String,
    pub format: OutputFormat,
    pub file_size_bytes: u64,
    pub caption_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Final report for a job, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_locator: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AssemblyMetadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn completed(
        job_id: impl Into<String>,
        output_locator: String,
        metadata: AssemblyMetadata,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            output_locator: Some(output_locator),
            metadata: Some(metadata),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            output_locator: None,
            metadata: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request_parses_with_defaults() {
        let json = r#"{
            "job_id": "job-1",
            "audio_locator": "narration.wav",
            "video_locators": ["a.mp4", "b.mp4"]
        }"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.video_locators.len(), 2);
        assert!(request.callback_url.is_none());
        assert!(!request.captions_config.enabled);
        assert!(request.effects_config.is_empty());
        assert_eq!(request.storage_config.key_for("job-1"), "generated/job-1.mp4");
    }

    #[test]
    fn test_captions_follow_script_only_when_enabled() {
        let segments = vec![ScriptSegment {
            text: "Hello".to_string(),
            start_time: 0.0,
            end_time: 2.5,
        }];
        let disabled = CaptionsConfig::default();
        assert!(disabled.captions_for(&segments).is_empty());

        let enabled = CaptionsConfig {
            enabled: true,
            ..CaptionsConfig::default()
        };
        let captions = enabled.captions_for(&segments);
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].text, "Hello");
        assert_eq!(captions[0].end_time, 2.5);
    }

    #[test]
    fn test_progress_fractions_increase() {
        let stages = [
            ProgressStage::Validating,
            ProgressStage::Downloading,
            ProgressStage::Processing,
            ProgressStage::Uploading,
        ];
        assert!(stages.windows(2).all(|w| w[0].fraction() < w[1].fraction()));
        assert_eq!(ProgressUpdate::new("j", ProgressStage::Processing).progress, 0.5);
    }

    #[test]
    fn test_progress_within_stage_stays_in_band() {
        let halfway = ProgressUpdate::within("j", ProgressStage::Processing, 0.5);
        assert!((halfway.progress - 0.65).abs() < 1e-9);
        assert_eq!(halfway.stage, ProgressStage::Processing);
        assert_eq!(ProgressUpdate::within("j", ProgressStage::Processing, 2.0).progress, 0.8);
        assert_eq!(ProgressUpdate::within("j", ProgressStage::Uploading, f64::NAN).progress, 0.8);
        assert_eq!(ProgressStage::Uploading.end_fraction(), 1.0);
    }

    #[test]
    fn test_failed_outcome_omits_output_fields() {
        let outcome = JobOutcome::failed("job-9", "boom");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "boom");
        assert!(value.get("output_locator").is_none());
        assert!(!outcome.is_success());
    }
}
