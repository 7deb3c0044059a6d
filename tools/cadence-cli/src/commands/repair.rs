//! Repair a timeline and optionally rescale it.

use std::path::PathBuf;

use cadence_common::config::AppConfig;
use cadence_timing_core::SceneGapValidator;

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    target: Option<f64>,
    min_duration: Option<f64>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let scenes = super::load_timeline(&path)?;
    let validator = SceneGapValidator::with_tolerance(config.timing.tolerance)?;

    let outcome = validator.fix_all_timing_issues(
        &scenes,
        min_duration.or(config.timing.min_repaired_scene_duration),
    )?;
    eprintln!(
        "Repaired {} scenes with {:?} in {} pass(es)",
        outcome.scenes.len(),
        outcome.strategy,
        outcome.passes
    );

    let repaired = match target {
        Some(target) => {
            let rescaled = validator.enforce_total_duration(&outcome.scenes, target)?;
            eprintln!("Rescaled timeline to {target:.6}s");
            rescaled
        }
        None => outcome.scenes,
    };

    let json = serde_json::to_string_pretty(&repaired)?;
    match output {
        Some(out) => {
            std::fs::write(&out, json)?;
            eprintln!("Wrote {}", out.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
