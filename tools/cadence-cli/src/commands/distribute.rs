//! Split a total duration into scene durations.

use cadence_common::config::AppConfig;
use cadence_timing_core::{DurationConstraints, SceneTimingCalculator};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config: &AppConfig,
    total: f64,
    count: usize,
    min: Option<f64>,
    max: Option<f64>,
    weights: Option<Vec<f64>>,
    track: bool,
    json: bool,
) -> anyhow::Result<()> {
    let calculator = SceneTimingCalculator::with_tolerance(config.timing.tolerance)?;

    if let Some(weights) = weights {
        let durations = calculator.distribute_weighted(total, &weights)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&durations)?);
        } else {
            print_durations(&durations);
        }
        return Ok(());
    }

    let constraints = DurationConstraints::new(
        min.or(config.timing.min_scene_duration),
        max.or(config.timing.max_scene_duration),
    );
    let timing = calculator.calculate_scene_timing(total, count, &constraints, track)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&timing)?);
        return Ok(());
    }

    println!("{:>5}  {:>12}  {:>12}  {:>12}", "scene", "start", "end", "duration");
    for (i, scene) in timing.scenes.iter().enumerate() {
        println!(
            "{:>5}  {:>12.6}  {:>12.6}  {:>12.6}",
            i, scene.start_time, scene.end_time, scene.duration
        );
    }
    println!("Total: {:.6}s across {} scenes", timing.total_duration, timing.scenes.len());
    if timing.durations.len() != count {
        println!(
            "Note: scene constraints changed the count from {} to {}",
            count,
            timing.durations.len()
        );
    }

    if let Some(report) = &timing.report {
        println!();
        println!("Baseline (even split): {:.6}s", report.baseline);
        for deficit in &report.deficits {
            println!("  scene {:>3} short by {:.6}s", deficit.scene, deficit.amount);
        }
        for surplus in &report.surpluses {
            println!("  scene {:>3} long by  {:.6}s", surplus.scene, surplus.amount);
        }
        println!(
            "Total deficit: {:.6}s, total surplus: {:.6}s",
            report.total_deficit, report.total_surplus
        );
    }

    Ok(())
}

fn print_durations(durations: &[f64]) {
    for (i, d) in durations.iter().enumerate() {
        println!("{:>5}  {:>12.6}", i, d);
    }
    println!("Total: {:.6}s", durations.iter().sum::<f64>());
}
