//! Audio-master synchronization.
//!
//! The narration track owns the clock. Clips are trimmed, extended, or
//! retimed until their durations equal the targets derived from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cadence_common::config::{ExtendStrategy, SyncConfig, TrimStrategy};
use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::tolerance::{ensure_non_negative, ensure_positive, DEFAULT_TOLERANCE};
use cadence_timeline_model::clip::{ExtensionFill, MediaClip};

use crate::scene_timing::{fold_residual, DurationConstraints, SceneTimingCalculator};

/// How a single clip is brought to its target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Fill used when the clip is too short. `None` sets the duration directly.
    pub extend_strategy: Option<ExtendStrategy>,
    pub trim_strategy: TrimStrategy,

    /// Retime instead of trimming or extending.
    pub adjust_speed: bool,
    pub fade_in_margin: f64,
    pub fade_out_margin: f64,
    pub min_video_duration: Option<f64>,
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            extend_strategy: config.extend_strategy,
            trim_strategy: config.trim_strategy,
            adjust_speed: config.adjust_speed,
            fade_in_margin: config.fade_in_margin,
            fade_out_margin: config.fade_out_margin,
            min_video_duration: config.min_video_duration,
        }
    }
}

/// Target for one clip in [`AudioMasterSync::sync_timeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub clip_id: String,
    pub start_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncMismatch {
    pub clip_index: usize,
    pub actual_duration: f64,
    pub expected_duration: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub clip_count: usize,
    pub expected_count: usize,
}

/// Element-wise comparison of clip durations with their expected values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub is_synced: bool,

    /// Set when the two sequences differ in length; no per-clip comparison is made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_mismatch: Option<CountMismatch>,
    pub mismatches: Vec<SyncMismatch>,
    pub total_video_duration: f64,
    pub total_expected_duration: f64,
    pub total_difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    NoChange,
    SpeedAdjustment,
    Trim,
    Extend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
}

/// Advisory result of [`AudioMasterSync::recommend_strategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecommendation {
    pub strategy: SyncStrategy,
    pub reason: String,

    /// `video / audio`, infinite when the audio duration is not positive.
    pub ratio: f64,

    /// `video - audio` in seconds.
    pub difference: f64,
    pub confidence: Confidence,
}

/// Forces clip durations onto audio-derived targets.
#[derive(Debug, Clone, Copy)]
pub struct AudioMasterSync {
    tolerance: f64,
}

impl Default for AudioMasterSync {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl AudioMasterSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: f64) -> CadenceResult<Self> {
        Ok(Self {
            tolerance: ensure_positive("tolerance", tolerance)?,
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// `max(target, min_video_duration) + fade_in_margin + fade_out_margin`.
    pub fn effective_target(&self, target: f64, options: &SyncOptions) -> CadenceResult<f64> {
        ensure_positive("target duration", target)?;
        let fade_in = ensure_non_negative("fade_in_margin", options.fade_in_margin)?;
        let fade_out = ensure_non_negative("fade_out_margin", options.fade_out_margin)?;
        let floor = match options.min_video_duration {
            Some(min) => ensure_non_negative("min_video_duration", min)?,
            None => 0.0,
        };
        Ok(target.max(floor) + fade_in + fade_out)
    }

    /// Bring `clip` to its effective target duration.
    pub fn sync<C: MediaClip>(&self, clip: &C, target: f64, options: &SyncOptions) -> CadenceResult<C> {
        let effective = self.effective_target(target, options)?;
        let current = clip.duration();

        if options.adjust_speed && (current - effective).abs() > self.tolerance {
            let factor = current / effective;
            tracing::debug!(current, effective, factor, "Retiming clip");
            return clip.time_scaled(factor);
        }

        if current > effective + self.tolerance {
            return match options.trim_strategy {
                TrimStrategy::FromStart => clip.subclip(0.0, effective),
                TrimStrategy::Center => {
                    let start = (current - effective) / 2.0;
                    clip.subclip(start, start + effective)
                }
                TrimStrategy::FromEnd => clip.with_duration(effective),
            };
        }

        if current < effective - self.tolerance {
            let shortfall = effective - current;
            return match options.extend_strategy {
                Some(ExtendStrategy::Loop) => clip.looped(effective),
                Some(ExtendStrategy::FreezeLast) => {
                    clip.extended(ExtensionFill::FreezeLastFrame, shortfall)
                }
                Some(ExtendStrategy::Black) => clip.extended(ExtensionFill::Black, shortfall),
                None => clip.with_duration(effective),
            };
        }

        clip.with_duration(effective)
    }

    /// Set the clip to exactly `audio_duration`. The visual preference never wins.
    pub fn enforce_audio_priority<C: MediaClip>(
        &self,
        clip: &C,
        audio_duration: f64,
        visual_preference: Option<f64>,
    ) -> CadenceResult<C> {
        let audio_duration = ensure_positive("audio duration", audio_duration)?;
        if let Some(preferred) = visual_preference {
            if (preferred - audio_duration).abs() > self.tolerance {
                tracing::debug!(
                    preferred,
                    audio_duration,
                    "Ignoring visual duration preference in favour of audio"
                );
            }
        }
        clip.with_duration(audio_duration)
    }

    /// Sync `clips[i]` to `targets[i]`.
    pub fn sync_many<C: MediaClip>(
        &self,
        clips: &[C],
        targets: &[f64],
        options: &SyncOptions,
    ) -> CadenceResult<Vec<C>> {
        if clips.len() != targets.len() {
            return Err(CadenceError::invalid_argument(format!(
                "{} clips but {} target durations",
                clips.len(),
                targets.len()
            )));
        }
        clips
            .iter()
            .zip(targets)
            .map(|(clip, &target)| self.sync(clip, target, options))
            .collect()
    }

    /// Sync clips looked up by id. Only clips named in `entries` are returned.
    pub fn sync_timeline<C: MediaClip>(
        &self,
        clips: &BTreeMap<String, C>,
        entries: &[TimelineEntry],
        options: &SyncOptions,
    ) -> CadenceResult<BTreeMap<String, C>> {
        let mut synced = BTreeMap::new();
        for entry in entries {
            let clip = clips.get(&entry.clip_id).ok_or_else(|| {
                CadenceError::invalid_argument(format!(
                    "clip '{}' not found in provided clips",
                    entry.clip_id
                ))
            })?;
            synced.insert(entry.clip_id.clone(), self.sync(clip, entry.duration, options)?);
        }
        Ok(synced)
    }

    /// Sync a whole sequence so that its targets sum to `master_duration`.
    ///
    /// Without `scene_durations` the master duration is split evenly. Supplied
    /// durations have their residual folded into the last scene first.
    pub fn sync_to_master<C: MediaClip>(
        &self,
        clips: &[C],
        master_duration: f64,
        scene_durations: Option<&[f64]>,
        options: &SyncOptions,
    ) -> CadenceResult<Vec<C>> {
        ensure_positive("master duration", master_duration)?;
        if clips.is_empty() {
            return Ok(Vec::new());
        }

        let durations = match scene_durations {
            Some(durations) => {
                if durations.len() != clips.len() {
                    return Err(CadenceError::invalid_argument(format!(
                        "{} clips but {} scene durations",
                        clips.len(),
                        durations.len()
                    )));
                }
                let mut durations = durations.to_vec();
                fold_residual(&mut durations, master_duration);
                durations
            }
            None => SceneTimingCalculator::with_tolerance(self.tolerance)?.distribute(
                master_duration,
                clips.len(),
                &DurationConstraints::NONE,
            )?,
        };

        self.sync_many(clips, &durations, options)
    }

    /// Compare clip durations with `expected` element-wise.
    pub fn validate_audio_video_sync<C: MediaClip>(&self, clips: &[C], expected: &[f64]) -> SyncReport {
        let total_video_duration: f64 = clips.iter().map(|c| c.duration()).sum();
        let total_expected_duration: f64 = expected.iter().sum();
        let total_difference = total_video_duration - total_expected_duration;

        if clips.len() != expected.len() {
            return SyncReport {
                is_synced: false,
                count_mismatch: Some(CountMismatch {
                    clip_count: clips.len(),
                    expected_count: expected.len(),
                }),
                mismatches: Vec::new(),
                total_video_duration,
                total_expected_duration,
                total_difference,
            };
        }

        let mismatches: Vec<SyncMismatch> = clips
            .iter()
            .zip(expected)
            .enumerate()
            .filter_map(|(clip_index, (clip, &expected_duration))| {
                let actual_duration = clip.duration();
                let difference = actual_duration - expected_duration;
                (difference.abs() > self.tolerance).then_some(SyncMismatch {
                    clip_index,
                    actual_duration,
                    expected_duration,
                    difference,
                })
            })
            .collect();

        SyncReport {
            is_synced: mismatches.is_empty(),
            count_mismatch: None,
            mismatches,
            total_video_duration,
            total_expected_duration,
            total_difference,
        }
    }

    /// Suggest how to reconcile a video of `video_duration` with `audio_duration`.
    pub fn recommend_strategy(&self, video_duration: f64, audio_duration: f64) -> SyncRecommendation {
        let ratio = if audio_duration > 0.0 {
            video_duration / audio_duration
        } else {
            f64::INFINITY
        };
        let difference = video_duration - audio_duration;

        let (strategy, reason) = if difference.abs() <= self.tolerance {
            (SyncStrategy::NoChange, "Durations already match within tolerance")
        } else if ratio > 2.0 {
            (
                SyncStrategy::SpeedAdjustment,
                "Large duration difference, speed adjustment recommended",
            )
        } else if difference > 0.0 {
            (SyncStrategy::Trim, "Video longer than audio, trimming recommended")
        } else {
            (SyncStrategy::Extend, "Video shorter than audio, extension recommended")
        };

        SyncRecommendation {
            strategy,
            reason: reason.to_string(),
            ratio,
            difference,
            confidence: if difference.abs() > 1.0 {
                Confidence::High
            } else {
                Confidence::Medium
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_timeline_model::clip::{ClipEdit, ClipPlan};

    fn clip(duration: f64) -> ClipPlan {
        ClipPlan::new("clip.mp4", duration).unwrap()
    }

    fn sync() -> AudioMasterSync {
        AudioMasterSync::new()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_rejects_non_positive_target() {
        let options = SyncOptions::default();
        assert!(matches!(
            sync().sync(&clip(5.0), 0.0, &options),
            Err(CadenceError::InvalidArgument { .. })
        ));
        assert!(sync().sync(&clip(5.0), -1.0, &options).is_err());
    }

    #[test]
    fn test_effective_target_applies_floor_and_margins() {
        let options = SyncOptions {
            fade_in_margin: 0.5,
            fade_out_margin: 0.25,
            min_video_duration: Some(4.0),
            ..SyncOptions::default()
        };
        assert_close(sync().effective_target(3.0, &options).unwrap(), 4.75);
        assert_close(sync().effective_target(6.0, &options).unwrap(), 6.75);
    }

    #[test]
    fn test_equal_duration_is_normalized() {
        let out = sync().sync(&clip(5.0), 5.0005, &SyncOptions::default()).unwrap();
        assert_eq!(out.edits, vec![ClipEdit::SetDuration { secs: 5.0005 }]);
    }

    #[test]
    fn test_trim_strategies() {
        let long = clip(10.0);
        let from_start = SyncOptions {
            trim_strategy: TrimStrategy::FromStart,
            ..SyncOptions::default()
        };
        let out = sync().sync(&long, 6.0, &from_start).unwrap();
        assert_eq!(out.edits, vec![ClipEdit::Subclip { start: 0.0, end: 6.0 }]);

        let center = SyncOptions {
            trim_strategy: TrimStrategy::Center,
            ..SyncOptions::default()
        };
        let out = sync().sync(&long, 6.0, &center).unwrap();
        assert_eq!(out.edits, vec![ClipEdit::Subclip { start: 2.0, end: 8.0 }]);

        let out = sync().sync(&long, 6.0, &SyncOptions::default()).unwrap();
        assert_eq!(out.edits, vec![ClipEdit::SetDuration { secs: 6.0 }]);
        assert_close(out.duration(), 6.0);
    }

    #[test]
    fn test_extend_strategies() {
        let short = clip(4.0);
        let with = |strategy| SyncOptions {
            extend_strategy: Some(strategy),
            ..SyncOptions::default()
        };

        let looped = sync().sync(&short, 10.0, &with(ExtendStrategy::Loop)).unwrap();
        assert_eq!(looped.edits, vec![ClipEdit::Loop { duration: 10.0 }]);

        let frozen = sync().sync(&short, 10.0, &with(ExtendStrategy::FreezeLast)).unwrap();
        assert_eq!(
            frozen.edits,
            vec![ClipEdit::Extend {
                fill: ExtensionFill::FreezeLastFrame,
                secs: 6.0
            }]
        );

        let black = sync().sync(&short, 10.0, &with(ExtendStrategy::Black)).unwrap();
        assert_close(black.duration(), 10.0);

        let default = sync().sync(&short, 10.0, &SyncOptions::default()).unwrap();
        assert_eq!(default.edits, vec![ClipEdit::SetDuration { secs: 10.0 }]);
    }

    #[test]
    fn test_adjust_speed_takes_precedence() {
        let options = SyncOptions {
            adjust_speed: true,
            extend_strategy: Some(ExtendStrategy::Loop),
            trim_strategy: TrimStrategy::Center,
            ..SyncOptions::default()
        };
        let out = sync().sync(&clip(12.0), 8.0, &options).unwrap();
        assert_eq!(out.edits, vec![ClipEdit::TimeScale { factor: 1.5 }]);
        assert_close(out.duration(), 8.0);
    }

    #[test]
    fn test_input_clip_is_unchanged() {
        let original = clip(12.0);
        let _ = sync().sync(&original, 3.0, &SyncOptions::default()).unwrap();
        assert!(original.is_untouched());
        assert_eq!(original.duration(), 12.0);
    }

    #[test]
    fn test_audio_priority_ignores_preference() {
        let out = sync()
            .enforce_audio_priority(&clip(60.0), 42.123, Some(55.0))
            .unwrap();
        assert_eq!(out.duration(), 42.123);
        let out = sync().enforce_audio_priority(&clip(60.0), 42.123, None).unwrap();
        assert_eq!(out.duration(), 42.123);
    }

    #[test]
    fn test_sync_many_count_mismatch() {
        let clips = vec![clip(1.0), clip(2.0)];
        assert!(matches!(
            sync().sync_many(&clips, &[1.0], &SyncOptions::default()),
            Err(CadenceError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_sync_timeline_by_id() {
        let mut clips = BTreeMap::new();
        clips.insert("intro".to_string(), clip(3.0));
        clips.insert("outro".to_string(), clip(9.0));
        let entries = vec![TimelineEntry {
            clip_id: "outro".to_string(),
            start_time: 0.0,
            duration: 4.0,
        }];
        let synced = sync()
            .sync_timeline(&clips, &entries, &SyncOptions::default())
            .unwrap();
        assert_eq!(synced.len(), 1);
        assert_close(synced["outro"].duration(), 4.0);

        let missing = vec![TimelineEntry {
            clip_id: "middle".to_string(),
            start_time: 0.0,
            duration: 4.0,
        }];
        assert!(sync()
            .sync_timeline(&clips, &missing, &SyncOptions::default())
            .is_err());
    }

    #[test]
    fn test_sync_to_master_derives_even_durations() {
        let clips = vec![clip(5.0), clip(20.0), clip(9.0)];
        let synced = sync()
            .sync_to_master(&clips, 30.0, None, &SyncOptions::default())
            .unwrap();
        let total: f64 = synced.iter().map(|c| c.duration()).sum();
        assert_close(total, 30.0);
        for c in &synced {
            assert!((c.duration() - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sync_to_master_corrects_supplied_durations() {
        let clips = vec![clip(5.0), clip(5.0)];
        let synced = sync()
            .sync_to_master(&clips, 12.0, Some(&[6.0, 5.5][..]), &SyncOptions::default())
            .unwrap();
        assert_close(synced[0].duration(), 6.0);
        assert_close(synced[1].duration(), 6.0);
        assert!(sync()
            .sync_to_master(&clips, 12.0, Some(&[12.0][..]), &SyncOptions::default())
            .is_err());
    }

    #[test]
    fn test_validate_sync_reports_mismatches() {
        let clips = vec![clip(5.0), clip(7.0)];
        let report = sync().validate_audio_video_sync(&clips, &[5.0, 6.0]);
        assert!(!report.is_synced);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].clip_index, 1);
        assert_close(report.mismatches[0].difference, 1.0);
        assert_close(report.total_difference, 1.0);

        let report = sync().validate_audio_video_sync(&clips, &[5.0]);
        assert!(!report.is_synced);
        assert_eq!(
            report.count_mismatch,
            Some(CountMismatch {
                clip_count: 2,
                expected_count: 1
            })
        );
    }

    #[test]
    fn test_recommendations() {
        let s = sync();
        assert_eq!(s.recommend_strategy(10.0, 10.0).strategy, SyncStrategy::NoChange);

        let speed = s.recommend_strategy(25.0, 10.0);
        assert_eq!(speed.strategy, SyncStrategy::SpeedAdjustment);
        assert_eq!(speed.confidence, Confidence::High);
        assert_close(speed.ratio, 2.5);

        let trim = s.recommend_strategy(10.5, 10.0);
        assert_eq!(trim.strategy, SyncStrategy::Trim);
        assert_eq!(trim.confidence, Confidence::Medium);

        let extend = s.recommend_strategy(6.0, 10.0);
        assert_eq!(extend.strategy, SyncStrategy::Extend);
        assert_eq!(extend.confidence, Confidence::High);

        assert!(s.recommend_strategy(5.0, 0.0).ratio.is_infinite());
    }
}
