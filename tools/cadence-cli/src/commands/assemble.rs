//! Run an assembly job from a JSON request.

use std::path::PathBuf;

use cadence_assembly_engine::{AssemblyPipeline, JobRunner, LocalDirectoryPublisher, TracingNotifier};
use cadence_common::config::AppConfig;
use cadence_timeline_model::job::JobRequest;

pub async fn run(config: &AppConfig, path: PathBuf, publish_root: PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read job {}: {e}", path.display()))?;
    let request: JobRequest = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid job request {}: {e}", path.display()))?;

    println!("Assembling job '{}'", request.job_id);
    println!("  Audio:    {}", request.audio_locator);
    println!("  Segments: {}", request.video_locators.len());

    let pipeline = AssemblyPipeline::from_config(config)?;
    let runner = JobRunner::new(
        pipeline,
        Box::new(LocalDirectoryPublisher::new(publish_root)),
        Box::new(TracingNotifier),
        config.work_dir.clone(),
        config.output.clone(),
    );

    let outcome = runner.run(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_success() {
        anyhow::bail!(
            "job '{}' failed: {}",
            outcome.job_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
