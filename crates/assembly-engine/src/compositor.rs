//! Composition of synced clips into the final rendered file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use cadence_common::config::{OutputConfig, OutputFormat};
use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::tolerance::ensure_positive;
use cadence_timeline_model::clip::{ClipEdit, ClipPlan, ExtensionFill, MediaClip};
use cadence_timeline_model::job::{Caption, EffectsConfig};

/// Everything a compositor needs to render one output.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    /// Clips in output order, each already brought to its scene length.
    pub clips: Vec<ClipPlan>,

    /// Narration track laid under the whole output.
    pub audio_locator: String,
    pub captions: Vec<Caption>,
    pub effects: EffectsConfig,
    pub output: OutputConfig,
    pub output_path: PathBuf,

    /// Output length in seconds. The audio duration.
    pub total_duration: f64,
}

impl CompositionRequest {
    /// A shortened copy of this request for a quick look at the result.
    ///
    /// The output is cut to `options.duration_secs` (or the full length if
    /// shorter). Every clip keeps its opening, shrunk in proportion so the
    /// clips still cover the preview exactly. Low and medium quality also
    /// reduce the frame size.
    pub fn preview(&self, options: &PreviewOptions) -> CadenceResult<CompositionRequest> {
        let requested = ensure_positive("preview duration", options.duration_secs)?;
        if self.clips.is_empty() {
            return Err(CadenceError::invalid_argument("composition needs at least one clip"));
        }
        let clip_total: f64 = self.clips.iter().map(|c| c.duration()).sum();
        if !clip_total.is_finite() || clip_total <= 0.0 {
            return Err(CadenceError::invalid_state(format!(
                "cannot preview clips totalling {clip_total}s"
            )));
        }

        let length = requested.min(self.total_duration);
        let scale = length / clip_total;
        let clips = self
            .clips
            .iter()
            .map(|clip| {
                let keep = (clip.duration() * scale).min(clip.duration());
                clip.subclip(0.0, keep)
            })
            .collect::<CadenceResult<Vec<_>>>()?;

        let captions = self
            .captions
            .iter()
            .filter(|c| c.start_time < length)
            .map(|c| Caption {
                end_time: c.end_time.min(length),
                ..c.clone()
            })
            .collect();

        let factor = options.quality.size_factor();
        let output = OutputConfig {
            width: even_dimension(self.output.width, factor),
            height: even_dimension(self.output.height, factor),
            ..self.output.clone()
        };

        Ok(CompositionRequest {
            clips,
            audio_locator: self.audio_locator.clone(),
            captions,
            effects: self.effects.clone(),
            output,
            output_path: preview_path(&self.output_path),
            total_duration: length,
        })
    }
}

fn even_dimension(size: u32, factor: f64) -> u32 {
    let scaled = (size as f64 * factor).round() as u32;
    (scaled & !1).max(2)
}

/// `out.mp4` becomes `out_preview.mp4` next to it.
pub fn preview_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output_path.extension() {
        Some(ext) => format!("{stem}_preview.{}", ext.to_string_lossy()),
        None => format!("{stem}_preview"),
    };
    output_path.with_file_name(name)
}

/// How much detail a preview keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewQuality {
    #[default]
    Low,
    Medium,
    High,
}

impl PreviewQuality {
    /// Frame size relative to the full output.
    pub fn size_factor(self) -> f64 {
        match self {
            PreviewQuality::Low => 0.5,
            PreviewQuality::Medium => 0.75,
            PreviewQuality::High => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewOptions {
    pub duration_secs: f64,
    pub quality: PreviewQuality,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            duration_secs: 10.0,
            quality: PreviewQuality::Low,
        }
    }
}

/// Receives render progress while a compositor runs.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send + Sync>;

/// How far a render has got.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProgress {
    /// Share of the output written, in `[0.0, 1.0]`.
    pub fraction: f64,

    /// Output timestamp reached so far.
    pub rendered_secs: f64,

    /// Seconds left, once any output exists to extrapolate from.
    pub eta_secs: Option<f64>,
}

/// Renders a [`CompositionRequest`] to disk.
#[async_trait::async_trait]
pub trait Compositor: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend can run on the current system.
    fn is_available(&self) -> bool;

    /// Render and return the path written.
    async fn compose(
        &self,
        request: &CompositionRequest,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<PathBuf>;

    /// Render a short, reduced version of `request` next to its output.
    async fn create_preview(
        &self,
        request: &CompositionRequest,
        options: &PreviewOptions,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<PathBuf> {
        let preview = request.preview(options)?;
        tracing::info!(
            output = %preview.output_path.display(),
            duration = preview.total_duration,
            quality = ?options.quality,
            "Rendering preview"
        );
        self.compose(&preview, progress).await
    }
}

/// Compositor that drives an `ffmpeg` process with a single filter graph.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    binary: String,
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl Compositor for FfmpegCompositor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        binary_on_path(&self.binary)
    }

    async fn compose(
        &self,
        request: &CompositionRequest,
        progress: Option<ProgressCallback>,
    ) -> CadenceResult<PathBuf> {
        if !request.captions.is_empty() {
            tracing::warn!(
                count = request.captions.len(),
                "Caption overlays are not rendered by the ffmpeg compositor"
            );
        }
        if !request.effects.is_empty() {
            tracing::warn!("Effects are accepted but not rendered by the ffmpeg compositor");
        }

        let args = build_ffmpeg_args(request)?;
        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        run_ffmpeg(&self.binary, &args, request.total_duration, progress).await?;

        if !tokio::fs::try_exists(&request.output_path).await? {
            return Err(CadenceError::export(format!(
                "ffmpeg reported success but {} was not written",
                request.output_path.display()
            )));
        }

        tracing::info!(
            output = %request.output_path.display(),
            clips = request.clips.len(),
            duration = request.total_duration,
            "Composition complete"
        );
        Ok(request.output_path.clone())
    }
}

/// Full ffmpeg argument list for `request`.
pub fn build_ffmpeg_args(request: &CompositionRequest) -> CadenceResult<Vec<String>> {
    if request.clips.is_empty() {
        return Err(CadenceError::invalid_argument("composition needs at least one clip"));
    }
    if !request.total_duration.is_finite() || request.total_duration <= 0.0 {
        return Err(CadenceError::invalid_argument(format!(
            "composition duration must be positive, got {}",
            request.total_duration
        )));
    }
    let out = &request.output;
    if out.width == 0 || out.height == 0 || out.fps == 0 {
        return Err(CadenceError::invalid_argument(format!(
            "invalid output geometry {}x{}@{}",
            out.width, out.height, out.fps
        )));
    }

    let mut args = vec!["-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string()];
    for clip in &request.clips {
        args.push("-i".to_string());
        args.push(clip.locator.clone());
    }
    args.push("-i".to_string());
    args.push(request.audio_locator.clone());

    let mut graph: Vec<String> = request
        .clips
        .iter()
        .enumerate()
        .map(|(i, clip)| format!("[{i}:v]{}[v{i}]", clip_filter_chain(clip, out)))
        .collect();
    let labels: String = (0..request.clips.len()).map(|i| format!("[v{i}]")).collect();
    graph.push(format!(
        "{labels}concat=n={}:v=1:a=0[vout]",
        request.clips.len()
    ));

    args.extend([
        "-filter_complex".to_string(),
        graph.join(";"),
        "-map".to_string(),
        "[vout]".to_string(),
        "-map".to_string(),
        format!("{}:a:0", request.clips.len()),
        "-t".to_string(),
        secs(request.total_duration),
        "-r".to_string(),
        out.fps.to_string(),
    ]);
    args.extend(codec_args_for_output(out));
    args.extend([
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        "-y".to_string(),
        request.output_path.to_string_lossy().into_owned(),
    ]);
    Ok(args)
}

/// Filters realizing `clip.edits`, then normalizing to the output geometry.
fn clip_filter_chain(clip: &ClipPlan, out: &OutputConfig) -> String {
    let mut filters = vec![format!("fps={}", out.fps)];
    let mut current = clip.source_duration;

    for edit in &clip.edits {
        match *edit {
            ClipEdit::SetDuration { secs: target } => {
                if target < current {
                    filters.push(format!("trim=duration={}", secs(target)));
                    filters.push("setpts=PTS-STARTPTS".to_string());
                } else if target > current {
                    filters.push(format!(
                        "tpad=stop_mode=clone:stop_duration={}",
                        secs(target - current)
                    ));
                }
                current = target;
            }
            ClipEdit::Subclip { start, end } => {
                filters.push(format!("trim=start={}:end={}", secs(start), secs(end)));
                filters.push("setpts=PTS-STARTPTS".to_string());
                current = end - start;
            }
            ClipEdit::Loop { duration } => {
                filters.push("loop=loop=-1:size=32767:start=0".to_string());
                filters.push("setpts=N/FRAME_RATE/TB".to_string());
                filters.push(format!("trim=duration={}", secs(duration)));
                current = duration;
            }
            ClipEdit::TimeScale { factor } => {
                filters.push(format!("setpts=PTS/{}", secs(factor)));
                current /= factor;
            }
            ClipEdit::Extend { fill, secs: extra } => {
                filters.push(match fill {
                    ExtensionFill::FreezeLastFrame => {
                        format!("tpad=stop_mode=clone:stop_duration={}", secs(extra))
                    }
                    ExtensionFill::Black => format!(
                        "tpad=stop_mode=add:stop_duration={}:color=black",
                        secs(extra)
                    ),
                });
                current += extra;
            }
        }
    }

    filters.push(format!("fps={}", out.fps));
    filters.push(format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease",
        w = out.width,
        h = out.height
    ));
    filters.push(format!(
        "pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = out.width,
        h = out.height
    ));
    filters.push("setsar=1".to_string());
    filters.push("format=yuv420p".to_string());
    filters.join(",")
}

fn codec_args_for_output(config: &OutputConfig) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_string(),
        config.format.video_codec().to_string(),
    ];

    match config.format {
        OutputFormat::Mp4H264 => args.extend([
            "-preset".to_string(),
            "medium".to_string(),
            "-profile:v".to_string(),
            "high".to_string(),
        ]),
        OutputFormat::Mp4H265 => args.extend(["-preset".to_string(), "medium".to_string()]),
        OutputFormat::Webm => {}
    }

    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        config.bitrate.clone(),
    ]);

    match config.format {
        OutputFormat::Mp4H264 | OutputFormat::Mp4H265 => args.extend([
            "-c:a".to_string(),
            config.audio_codec.clone(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]),
        OutputFormat::Webm => args.extend([
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
        ]),
    }
    args
}

fn secs(value: f64) -> String {
    format!("{value:.6}")
}

async fn run_ffmpeg(
    binary: &str,
    args: &[String],
    expected_secs: f64,
    progress: Option<ProgressCallback>,
) -> CadenceResult<()> {
    tracing::debug!(?args, "Running ffmpeg");
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CadenceError::export(format!("failed to start {binary}: {e}")))?;
    tracing::info!(pid = child.id(), expected_secs, "ffmpeg started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CadenceError::export("ffmpeg stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| CadenceError::export("ffmpeg stderr was not captured"))?;

    // Drained alongside stdout; ffmpeg stalls once the stderr pipe is full.
    let stderr_text = tokio::spawn(async move {
        let mut text = String::new();
        if let Err(e) = stderr.read_to_string(&mut text).await {
            text.push_str(&format!("<stderr unreadable: {e}>"));
        }
        text
    });

    let started = Instant::now();
    let mut tracker = RenderTracker::new(expected_secs);
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| CadenceError::export(format!("lost ffmpeg progress stream: {e}")))?
    {
        let Some(report) = tracker.observe(&line, started.elapsed().as_secs_f64()) else {
            continue;
        };
        tracing::trace!(fraction = report.fraction, rendered_secs = report.rendered_secs, "Render progress");
        if let Some(cb) = &progress {
            cb(report);
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| CadenceError::export(format!("failed to wait for ffmpeg: {e}")))?;
    let stderr_text = stderr_text.await.unwrap_or_default();
    if !status.success() {
        return Err(CadenceError::export(format!(
            "ffmpeg exited with {status}: {}",
            stderr_text.trim()
        )));
    }
    tracing::debug!(elapsed_secs = started.elapsed().as_secs_f64(), "ffmpeg finished");
    Ok(())
}

/// Whether `binary` names an executable file, directly or through `PATH`.
pub(crate) fn binary_on_path(binary: &str) -> bool {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

/// Folds the `key=value` lines of ffmpeg's `-progress` stream into reports.
///
/// ffmpeg ends every block with a `progress=continue` or `progress=end`
/// line; that line yields one [`RenderProgress`].
#[derive(Debug)]
struct RenderTracker {
    expected_secs: f64,
    rendered_secs: f64,
}

impl RenderTracker {
    fn new(expected_secs: f64) -> Self {
        Self {
            expected_secs,
            rendered_secs: 0.0,
        }
    }

    fn observe(&mut self, line: &str, elapsed_secs: f64) -> Option<RenderProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                // "N/A" before the first frame.
                if let Ok(us) = value.parse::<i64>() {
                    self.rendered_secs = us.max(0) as f64 / 1_000_000.0;
                }
                None
            }
            "progress" => Some(self.report(value == "end", elapsed_secs)),
            _ => None,
        }
    }

    fn report(&self, finished: bool, elapsed_secs: f64) -> RenderProgress {
        let fraction = if finished {
            1.0
        } else if self.expected_secs > 0.0 {
            (self.rendered_secs / self.expected_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let eta_secs = (!finished && fraction > 0.0)
            .then(|| elapsed_secs * (1.0 - fraction) / fraction);
        RenderProgress {
            fraction,
            rendered_secs: self.rendered_secs,
            eta_secs,
        }
    }
}
