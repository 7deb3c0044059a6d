//! Check a timeline for gaps and overlaps.

use std::path::PathBuf;

use cadence_common::config::AppConfig;
use cadence_timeline_model::scene::Scene;
use cadence_timing_core::{ContinuityIssue, SceneGapValidator};

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    println!("Validating timeline at: {}", path.display());

    let scenes: Vec<Scene> = super::load_timeline(&path)?;
    let validator = SceneGapValidator::with_tolerance(config.timing.tolerance)?;
    let summary = validator.continuity_summary(&scenes)?;

    println!("  Scenes: {}", summary.scene_count);
    println!("  Total duration: {:.6}s", summary.total_duration);

    if summary.is_continuous {
        println!("\nTimeline is continuous.");
        return Ok(());
    }

    println!("\nContinuity issues:");
    for issue in &summary.issues {
        match issue {
            ContinuityIssue::Gap(gap) => println!(
                "  - gap of {:.6}s after scene {} ({:.6} -> {:.6})",
                gap.gap_duration, gap.after_scene, gap.gap_start, gap.gap_end
            ),
            ContinuityIssue::Overlap(overlap) => println!(
                "  - overlap of {:.6}s between scenes {} and {} ({:.6} -> {:.6})",
                overlap.overlap_duration,
                overlap.scene1,
                overlap.scene2,
                overlap.overlap_start,
                overlap.overlap_end
            ),
        }
    }
    println!(
        "\n{} gap(s) totalling {:.6}s, {} overlap(s) totalling {:.6}s.",
        summary.gap_count,
        summary.total_gap_duration,
        summary.overlap_count,
        summary.total_overlap_duration
    );
    println!("Run `cadence repair` to fix them.");

    Ok(())
}
