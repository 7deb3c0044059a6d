//! Suggest a sync strategy for a video/audio pair.

use cadence_common::config::AppConfig;
use cadence_timing_core::AudioMasterSync;

pub fn run(config: &AppConfig, video: f64, audio: f64) -> anyhow::Result<()> {
    let sync = AudioMasterSync::with_tolerance(config.timing.tolerance)?;
    let rec = sync.recommend_strategy(video, audio);

    println!("Strategy:   {:?}", rec.strategy);
    println!("Reason:     {}", rec.reason);
    println!("Ratio:      {:.4}", rec.ratio);
    println!("Difference: {:+.6}s", rec.difference);
    println!("Confidence: {:?}", rec.confidence);

    Ok(())
}
