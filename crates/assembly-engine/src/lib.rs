//! Cadence Assembly Engine
//!
//! The I/O side of Cadence. Probes media durations, runs the timing core
//! against them, and hands the synced clips to a compositor.
//!
//! ```text
//! audio ──> DurationSource ──> SceneTimingCalculator ──> AudioMasterSync
//!                                                              │
//! output <── Compositor <── SceneGapValidator <────────────────┘
//! ```

pub mod compositor;
pub mod delivery;
pub mod duration;
pub mod job;
pub mod pipeline;

pub use compositor::{
    CompositionRequest, Compositor, FfmpegCompositor, PreviewOptions, PreviewQuality,
    ProgressCallback, RenderProgress,
};
pub use delivery::{JobNotifier, LocalDirectoryPublisher, OutputPublisher, TracingNotifier};
pub use duration::{
    wav_duration_from_bytes, DurationBackend, DurationSource, FfprobeBackend, WavHeaderBackend,
};
pub use job::JobRunner;
pub use pipeline::{AssemblyInput, AssemblyOutput, AssemblyPipeline, PipelineStage};
