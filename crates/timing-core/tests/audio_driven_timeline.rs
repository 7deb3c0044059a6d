//! End-to-end timing flow without media: narration length in, continuous
//! timeline of synced clips out.

use cadence_common::config::{ExtendStrategy, TrimStrategy};
use cadence_timeline_model::clip::{ClipEdit, ClipPlan, MediaClip};
use cadence_timeline_model::scene::Scene;
use cadence_timing_core::{
    AudioMasterSync, DurationConstraints, RepairStrategy, SceneGapValidator,
    SceneTimingCalculator, SyncOptions,
};

fn sources() -> Vec<ClipPlan> {
    [("intro.mp4", 4.2), ("demo.mp4", 31.0), ("outro.mp4", 9.5)]
        .into_iter()
        .map(|(locator, secs)| ClipPlan::new(locator, secs).unwrap())
        .collect()
}

#[test]
fn narration_drives_clip_durations_and_timeline() {
    let audio_duration = 42.123;
    let clips = sources();

    let durations = SceneTimingCalculator::new()
        .distribute(audio_duration, clips.len(), &DurationConstraints::NONE)
        .unwrap();

    let options = SyncOptions {
        extend_strategy: Some(ExtendStrategy::Loop),
        trim_strategy: TrimStrategy::Center,
        ..SyncOptions::default()
    };
    let sync = AudioMasterSync::new();
    let synced = sync
        .sync_to_master(&clips, audio_duration, Some(durations.as_slice()), &options)
        .unwrap();

    // Short clips loop and the long demo is trimmed around its centre.
    assert!(matches!(synced[0].edits[0], ClipEdit::Loop { .. }));
    assert!(matches!(synced[1].edits[0], ClipEdit::Subclip { .. }));
    assert!(matches!(synced[2].edits[0], ClipEdit::Loop { .. }));

    let report = sync.validate_audio_video_sync(&synced, &durations);
    assert!(report.is_synced, "{report:?}");

    let timeline = Scene::contiguous(
        &synced.iter().map(|c| c.duration()).collect::<Vec<_>>(),
        0.0,
    );
    let validator = SceneGapValidator::new();
    let continuity = validator.validate(&timeline).unwrap();
    assert!(continuity.is_valid);
    assert!((continuity.total_duration - audio_duration).abs() < 0.001);
}

#[test]
fn damaged_timeline_is_repaired_then_rescaled_to_audio() {
    let audio_duration = 60.0;
    let damaged = vec![
        Scene::new(0.0, 12.0),
        Scene::new(10.0, 25.0),
        Scene::new(27.0, 41.0),
        Scene::new(41.0, 50.0),
    ];

    let validator = SceneGapValidator::new();
    let before = validator.validate(&damaged).unwrap();
    assert_eq!(before.gaps.len(), 1);
    assert_eq!(before.overlaps.len(), 1);

    let repaired = validator.fix_all_timing_issues(&damaged, None).unwrap();
    assert_eq!(repaired.strategy, RepairStrategy::TrimAndExtend);
    assert!(validator.validate(&repaired.scenes).unwrap().is_valid);

    let rescaled = validator
        .enforce_total_duration(&repaired.scenes, audio_duration)
        .unwrap();
    let total: f64 = rescaled.iter().map(|s| s.duration).sum();
    assert!((total - audio_duration).abs() < 0.001);
    assert!(validator.validate(&rescaled).unwrap().is_valid);

    // Forcing each clip onto its repaired scene keeps the audio-exact total.
    let sync = AudioMasterSync::new();
    let clips: Vec<ClipPlan> = rescaled
        .iter()
        .map(|scene| {
            let clip = ClipPlan::new("segment.mp4", 20.0).unwrap();
            sync.enforce_audio_priority(&clip, scene.duration, Some(20.0))
                .unwrap()
        })
        .collect();
    let clip_total: f64 = clips.iter().map(|c| c.duration()).sum();
    assert!((clip_total - audio_duration).abs() < 0.001);
}

#[test]
fn constrained_distribution_feeds_timing_summary() {
    let timing = SceneTimingCalculator::new()
        .calculate_scene_timing(95.0, 3, &DurationConstraints::new(Some(5.0), Some(20.0)), true)
        .unwrap();

    assert_eq!(timing.durations.len(), 5);
    assert!(timing.durations.iter().all(|&d| d <= 20.0 + 0.001));
    assert!(timing.gaps_detected.is_empty());
    assert!((timing.total_duration - 95.0).abs() < 0.001);

    let report = timing.report.unwrap();
    assert!(report.constraint_applied.is_some());

    let summary = SceneGapValidator::new()
        .continuity_summary(&timing.scenes)
        .unwrap();
    assert!(summary.is_continuous);
    assert_eq!(summary.scene_count, 5);
}
