//! The audio-driven assembly pipeline.
//!
//! One [`AssemblyPipeline::assemble`] call runs every stage of a job in
//! order. The narration length is measured once and every later stage is
//! bent to fit it: scene durations are derived from it, clips are forced
//! onto those scenes, and the timeline is rescaled if it drifts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cadence_common::config::{AppConfig, OutputConfig, TimingConfig};
use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::tolerance::within;
use cadence_timeline_model::clip::{ClipPlan, MediaClip};
use cadence_timeline_model::job::{AssemblyMetadata, Caption, EffectsConfig};
use cadence_timeline_model::scene::Scene;
use cadence_timing_core::{
    AudioMasterSync, DurationConstraints, SceneGapValidator, SceneTimingCalculator, SyncOptions,
};

use crate::compositor::{
    preview_path, CompositionRequest, Compositor, FfmpegCompositor, PreviewOptions,
    ProgressCallback,
};
use crate::duration::DurationSource;

/// Largest audio/video length difference still reported as a match.
pub const DURATION_MATCH_SECS: f64 = 0.1;

/// Stages of an assembly, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validation,
    AudioDuration,
    LoadSegments,
    SceneTiming,
    AudioSync,
    GapValidation,
    Export,
    Metadata,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Validation => "validation",
            PipelineStage::AudioDuration => "audio_duration",
            PipelineStage::LoadSegments => "load_segments",
            PipelineStage::SceneTiming => "scene_timing",
            PipelineStage::AudioSync => "audio_sync",
            PipelineStage::GapValidation => "gap_validation",
            PipelineStage::Export => "export",
            PipelineStage::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One assembly to run.
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub job_id: String,
    pub audio_locator: String,
    pub video_locators: Vec<String>,
    pub captions: Vec<Caption>,
    pub effects: EffectsConfig,
    pub output: OutputConfig,
    pub output_path: PathBuf,
}

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub output_path: PathBuf,
    pub metadata: AssemblyMetadata,

    /// Clips as handed to the compositor.
    pub clips: Vec<ClipPlan>,

    /// Final contiguous timeline.
    pub scenes: Vec<Scene>,
}

/// A settled timeline and the render request built from it.
struct AssemblyPlan {
    audio_duration: f64,
    clips: Vec<ClipPlan>,
    scenes: Vec<Scene>,
    request: CompositionRequest,
}

/// Orchestrates timing, sync, repair and composition for a job.
pub struct AssemblyPipeline {
    durations: DurationSource,
    compositor: Box<dyn Compositor>,
    timing: TimingConfig,
    sync_options: SyncOptions,
    calculator: SceneTimingCalculator,
    validator: SceneGapValidator,
    syncer: AudioMasterSync,
}

impl AssemblyPipeline {
    pub fn new(
        config: &AppConfig,
        durations: DurationSource,
        compositor: Box<dyn Compositor>,
    ) -> CadenceResult<Self> {
        config.timing.validate()?;
        let tolerance = config.timing.tolerance;
        Ok(Self {
            durations,
            compositor,
            timing: config.timing.clone(),
            sync_options: SyncOptions::from(&config.sync),
            calculator: SceneTimingCalculator::with_tolerance(tolerance)?,
            validator: SceneGapValidator::with_tolerance(tolerance)?,
            syncer: AudioMasterSync::with_tolerance(tolerance)?,
        })
    }

    /// Standard duration backends and the ffmpeg compositor.
    pub fn from_config(config: &AppConfig) -> CadenceResult<Self> {
        let durations = if config.cache_durations {
            DurationSource::standard().with_cache()
        } else {
            DurationSource::standard()
        };
        Self::new(config, durations, Box::new(FfmpegCompositor::new()))
    }

    pub fn compositor_name(&self) -> &str {
        self.compositor.name()
    }

    pub async fn assemble(&self, input: &AssemblyInput) -> CadenceResult<AssemblyOutput> {
        self.assemble_with_progress(input, None).await
    }

    /// Run every stage. On failure any partially written output is removed.
    pub async fn assemble_with_progress(
        &self,
        input: &AssemblyInput,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<AssemblyOutput> {
        match self.run_stages(input, progress).await {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::error!(job_id = %input.job_id, error = %e, "Assembly failed");
                remove_partial_output(&input.output_path).await;
                Err(e)
            }
        }
    }

    /// Run every stage up to composition, then render only a preview
    /// beside `input.output_path` (`out.mp4` becomes `out_preview.mp4`).
    /// No metadata is collected.
    pub async fn preview(
        &self,
        input: &AssemblyInput,
        options: &PreviewOptions,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<PathBuf> {
        match self.render_preview(input, options, progress).await {
            Ok(path) => Ok(path),
            Err(e) => {
                tracing::error!(job_id = %input.job_id, error = %e, "Preview failed");
                remove_partial_output(&preview_path(&input.output_path)).await;
                Err(e)
            }
        }
    }

    async fn render_preview(
        &self,
        input: &AssemblyInput,
        options: &PreviewOptions,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<PathBuf> {
        let plan = self.plan(input).await?;
        tracing::info!(job_id = %input.job_id, stage = %PipelineStage::Export, "Composing preview");
        self.ensure_compositor().map_err(at(PipelineStage::Export))?;
        self.compositor
            .create_preview(&plan.request, options, progress)
            .await
            .map_err(at(PipelineStage::Export))
    }

    async fn run_stages(
        &self,
        input: &AssemblyInput,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<AssemblyOutput> {
        let job_id = input.job_id.as_str();
        let AssemblyPlan {
            audio_duration,
            clips,
            scenes,
            request,
        } = self.plan(input).await?;

        tracing::info!(job_id, stage = %PipelineStage::Export, compositor = self.compositor.name(), "Composing output");
        let output_path = self
            .compose(&request, progress)
            .await
            .map_err(at(PipelineStage::Export))?;

        tracing::info!(job_id, stage = %PipelineStage::Metadata, "Collecting metadata");
        let metadata = build_metadata(input, &clips, &scenes, audio_duration, &output_path)
            .await
            .map_err(at(PipelineStage::Metadata))?;

        tracing::info!(
            job_id,
            output = %output_path.display(),
            duration_match = metadata.duration_match,
            "Assembly complete"
        );
        Ok(AssemblyOutput {
            output_path,
            metadata,
            clips,
            scenes,
        })
    }

    /// Validation through gap repair: everything before rendering.
    async fn plan(&self, input: &AssemblyInput) -> CadenceResult<AssemblyPlan> {
        let job_id = input.job_id.as_str();

        tracing::info!(job_id, stage = %PipelineStage::Validation, "Validating input");
        validate_input(input).map_err(at(PipelineStage::Validation))?;

        tracing::info!(job_id, stage = %PipelineStage::AudioDuration, "Measuring narration");
        let audio_duration = self
            .durations
            .extract(&input.audio_locator)
            .await
            .map_err(at(PipelineStage::AudioDuration))?;
        tracing::info!(job_id, audio_duration, "Audio duration is authoritative");

        tracing::info!(
            job_id,
            stage = %PipelineStage::LoadSegments,
            segments = input.video_locators.len(),
            "Probing video segments"
        );
        let clips = self
            .load_segments(&input.video_locators)
            .await
            .map_err(at(PipelineStage::LoadSegments))?;

        tracing::info!(job_id, stage = %PipelineStage::SceneTiming, "Distributing scene durations");
        let targets = self
            .scene_durations(audio_duration, clips.len())
            .map_err(at(PipelineStage::SceneTiming))?;

        tracing::info!(job_id, stage = %PipelineStage::AudioSync, "Syncing clips to narration");
        let synced = self
            .sync_clips(&clips, &targets)
            .map_err(at(PipelineStage::AudioSync))?;

        tracing::info!(job_id, stage = %PipelineStage::GapValidation, "Checking timeline continuity");
        let (clips, scenes) = self
            .settle_timeline(synced, audio_duration)
            .map_err(at(PipelineStage::GapValidation))?;

        let request = CompositionRequest {
            clips: clips.clone(),
            audio_locator: input.audio_locator.clone(),
            captions: input.captions.clone(),
            effects: input.effects.clone(),
            output: input.output.clone(),
            output_path: input.output_path.clone(),
            total_duration: audio_duration,
        };
        Ok(AssemblyPlan {
            audio_duration,
            clips,
            scenes,
            request,
        })
    }

    async fn load_segments(&self, locators: &[String]) -> CadenceResult<Vec<ClipPlan>> {
        let mut clips = Vec::with_capacity(locators.len());
        for locator in locators {
            let duration = self.durations.extract(locator).await?;
            tracing::debug!(locator = %locator, duration, "Loaded segment");
            clips.push(ClipPlan::new(locator.clone(), duration)?);
        }
        Ok(clips)
    }

    fn scene_durations(&self, audio_duration: f64, segment_count: usize) -> CadenceResult<Vec<f64>> {
        let constraints = DurationConstraints::new(
            self.timing.min_scene_duration,
            self.timing.max_scene_duration,
        );
        let durations = self
            .calculator
            .distribute(audio_duration, segment_count, &constraints)?;
        if durations.len() != segment_count {
            return Err(CadenceError::invalid_argument(format!(
                "scene constraints need {} scenes for {:.3}s of audio but {} segments were supplied",
                durations.len(),
                audio_duration,
                segment_count
            )));
        }
        Ok(durations)
    }

    /// Choose material with the configured strategy, then pin every clip to
    /// its audio-derived target. Fade margins never survive the pin.
    fn sync_clips(&self, clips: &[ClipPlan], targets: &[f64]) -> CadenceResult<Vec<ClipPlan>> {
        let shaped = self.syncer.sync_many(clips, targets, &self.sync_options)?;
        let synced = shaped
            .iter()
            .zip(targets)
            .map(|(clip, &target)| {
                if within(clip.duration(), target, self.syncer.tolerance()) {
                    Ok(clip.clone())
                } else {
                    self.syncer
                        .enforce_audio_priority(clip, target, Some(clip.duration()))
                }
            })
            .collect::<CadenceResult<Vec<_>>>()?;

        let report = self.syncer.validate_audio_video_sync(&synced, targets);
        if !report.is_synced {
            return Err(CadenceError::invalid_state(format!(
                "{} clips out of sync with narration (total difference {:.3}s)",
                report.mismatches.len(),
                report.total_difference
            )));
        }
        Ok(synced)
    }

    fn settle_timeline(
        &self,
        clips: Vec<ClipPlan>,
        audio_duration: f64,
    ) -> CadenceResult<(Vec<ClipPlan>, Vec<Scene>)> {
        let durations: Vec<f64> = clips.iter().map(|c| c.duration()).collect();
        let mut scenes = Scene::contiguous(&durations, 0.0);

        let report = self.validator.validate(&scenes)?;
        if !report.is_valid {
            tracing::warn!(issues = %report.message(), "Repairing timeline");
            let outcome = self
                .validator
                .fix_all_timing_issues(&scenes, self.timing.min_repaired_scene_duration)?;
            tracing::warn!(strategy = ?outcome.strategy, passes = outcome.passes, "Timeline repaired");
            scenes = outcome.scenes;
        }

        let total: f64 = scenes.iter().map(|s| s.duration).sum();
        if !within(total, audio_duration, self.validator.tolerance()) {
            tracing::warn!(total, audio_duration, "Rescaling timeline to narration length");
            scenes = self.validator.enforce_total_duration(&scenes, audio_duration)?;
        }

        let clips = clips
            .iter()
            .zip(&scenes)
            .map(|(clip, scene)| {
                if within(clip.duration(), scene.duration, self.syncer.tolerance()) {
                    Ok(clip.clone())
                } else {
                    self.syncer
                        .enforce_audio_priority(clip, scene.duration, Some(clip.duration()))
                }
            })
            .collect::<CadenceResult<Vec<_>>>()?;

        Ok((clips, scenes))
    }

    async fn compose(
        &self,
        request: &CompositionRequest,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<PathBuf> {
        self.ensure_compositor()?;
        self.compositor.compose(request, progress).await
    }

    fn ensure_compositor(&self) -> CadenceResult<()> {
        if self.compositor.is_available() {
            return Ok(());
        }
        Err(CadenceError::unsupported(format!(
            "compositor '{}' is not available on this system",
            self.compositor.name()
        )))
    }
}

fn at(stage: PipelineStage) -> impl FnOnce(CadenceError) -> CadenceError {
    move |e| e.in_stage(stage.as_str())
}

fn validate_input(input: &AssemblyInput) -> CadenceResult<()> {
    if input.audio_locator.trim().is_empty() {
        return Err(CadenceError::invalid_argument("audio locator is empty"));
    }
    if input.video_locators.is_empty() {
        return Err(CadenceError::invalid_argument(
            "at least one video segment is required",
        ));
    }
    if let Some(idx) = input.video_locators.iter().position(|l| l.trim().is_empty()) {
        return Err(CadenceError::invalid_argument(format!(
            "video locator {idx} is empty"
        )));
    }
    if input.output_path.as_os_str().is_empty() {
        return Err(CadenceError::invalid_argument("output path is empty"));
    }
    Ok(())
}

async fn build_metadata(
    input: &AssemblyInput,
    clips: &[ClipPlan],
    scenes: &[Scene],
    audio_duration: f64,
    output_path: &Path,
) -> CadenceResult<AssemblyMetadata> {
    let file_size_bytes = tokio::fs::metadata(output_path).await?.len();
    let total_video_duration: f64 = clips.iter().map(|c| c.duration()).sum();
    let out = &input.output;

    Ok(AssemblyMetadata {
        segment_count: clips.len(),
        scene_durations: scenes.iter().map(|s| s.duration).collect(),
        total_video_duration,
        audio_duration,
        duration_match: (total_video_duration - audio_duration).abs() < DURATION_MATCH_SECS,
        resolution: format!("{}x{}", out.width, out.height),
        fps: out.fps,
        codec: out.format.video_codec().to_string(),
        bitrate: out.bitrate.clone(),
        format: out.format,
        file_size_bytes,
        caption_count: input.captions.len(),
    })
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> AssemblyInput {
        AssemblyInput {
            job_id: "job".to_string(),
            audio_locator: "narration.wav".to_string(),
            video_locators: vec!["a.mp4".to_string()],
            captions: Vec::new(),
            effects: EffectsConfig::default(),
            output: OutputConfig::default(),
            output_path: PathBuf::from("out.mp4"),
        }
    }

    #[test]
    fn test_validate_input_requires_segments_and_audio() {
        assert!(validate_input(&input()).is_ok());

        let mut no_video = input();
        no_video.video_locators.clear();
        assert!(matches!(
            validate_input(&no_video),
            Err(CadenceError::InvalidArgument { .. })
        ));

        let mut no_audio = input();
        no_audio.audio_locator = "  ".to_string();
        assert!(validate_input(&no_audio).is_err());

        let mut blank_segment = input();
        blank_segment.video_locators.push(String::new());
        assert!(validate_input(&blank_segment).is_err());
    }

    #[test]
    fn test_stage_names_are_snake_case() {
        assert_eq!(PipelineStage::AudioDuration.as_str(), "audio_duration");
        assert_eq!(PipelineStage::GapValidation.to_string(), "gap_validation");
        let err = at(PipelineStage::Export)(CadenceError::export("boom"));
        assert_eq!(err.stage(), Some("export"));
        assert!(matches!(err.root(), CadenceError::Export { .. }));
    }

    #[test]
    fn test_constraint_driven_count_change_is_rejected() {
        let mut config = AppConfig::default();
        config.timing.max_scene_duration = Some(10.0);
        let pipeline = AssemblyPipeline::new(
            &config,
            DurationSource::new(Vec::new()),
            Box::new(FfmpegCompositor::new()),
        )
        .unwrap();

        assert_eq!(pipeline.scene_durations(30.0, 3).unwrap().len(), 3);
        assert!(matches!(
            pipeline.scene_durations(45.0, 3),
            Err(CadenceError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_sync_clips_pins_targets_despite_margins() {
        let mut config = AppConfig::default();
        config.sync.fade_in_margin = 0.5;
        config.sync.fade_out_margin = 0.5;
        let pipeline = AssemblyPipeline::new(
            &config,
            DurationSource::new(Vec::new()),
            Box::new(FfmpegCompositor::new()),
        )
        .unwrap();

        let clips = vec![
            ClipPlan::new("a.mp4", 20.0).unwrap(),
            ClipPlan::new("b.mp4", 3.0).unwrap(),
        ];
        let synced = pipeline.sync_clips(&clips, &[10.0, 10.0]).unwrap();
        assert!(synced.iter().all(|c| (c.duration() - 10.0).abs() < 1e-9));
    }
}
