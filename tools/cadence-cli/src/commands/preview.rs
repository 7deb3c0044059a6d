//! Render a short preview of an assembly job.

use std::io::Write;
use std::path::PathBuf;

use cadence_assembly_engine::job::apply_overrides;
use cadence_assembly_engine::{
    AssemblyInput, AssemblyPipeline, PreviewOptions, PreviewQuality, ProgressCallback,
    RenderProgress,
};
use cadence_common::config::AppConfig;
use cadence_timeline_model::job::JobRequest;

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    seconds: f64,
    quality: String,
    output: PathBuf,
) -> anyhow::Result<()> {
    let quality = match quality.as_str() {
        "low" => PreviewQuality::Low,
        "medium" => PreviewQuality::Medium,
        "high" => PreviewQuality::High,
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown quality: {quality}. Use: low, medium, high"
            ));
        }
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read job {}: {e}", path.display()))?;
    let request: JobRequest = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid job request {}: {e}", path.display()))?;

    let input = AssemblyInput {
        job_id: request.job_id.clone(),
        audio_locator: request.audio_locator.clone(),
        video_locators: request.video_locators.clone(),
        captions: request
            .captions_config
            .captions_for(&request.script_segments),
        effects: request.effects_config.clone(),
        output: apply_overrides(&config.output, &request.output_config),
        output_path: output,
    };
    let options = PreviewOptions {
        duration_secs: seconds,
        quality,
    };

    println!("Previewing job '{}'", request.job_id);
    println!("  Length:  {seconds}s");
    println!("  Quality: {quality:?}");

    let progress_cb: ProgressCallback = Box::new(|p: RenderProgress| {
        print!(
            "\r  Progress: {:.1}% ({:.1}s rendered, ETA: {})  ",
            p.fraction * 100.0,
            p.rendered_secs,
            p.eta_secs
                .map(|eta| format!("{eta:.0}s"))
                .unwrap_or_else(|| "-".to_string()),
        );
        let _ = std::io::stdout().flush();
    });

    let pipeline = AssemblyPipeline::from_config(config)?;
    let written = pipeline.preview(&input, &options, Some(progress_cb)).await?;
    println!("\nPreview written to {}", written.display());
    Ok(())
}
