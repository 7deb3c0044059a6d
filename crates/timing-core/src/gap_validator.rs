//! Gap and overlap detection and repair for scene timelines.
//!
//! Every repair takes a timeline by reference and returns a new one. The
//! composite [`SceneGapValidator::fix_all_timing_issues`] is a bounded loop
//! that either produces a continuous timeline or fails with `InvalidState`.

use serde::{Deserialize, Serialize};

use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::tolerance::{ensure_positive, DEFAULT_TOLERANCE};
use cadence_timeline_model::scene::{total_scene_duration, ContinuityReport, Gap, Overlap, Scene};

/// Duration given to a scene that overlap trimming would otherwise erase.
pub const MIN_TRIMMED_SCENE_SECS: f64 = 0.1;

/// Trim-then-extend passes attempted before falling back to shifting.
pub const MAX_REPAIR_PASSES: usize = 2;

/// Which repair produced a [`RepairOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// Input was already continuous.
    Unchanged,
    /// Overlaps trimmed, then gaps closed by extending earlier scenes.
    TrimAndExtend,
    /// Gaps closed by shifting later scenes, then overlaps trimmed.
    ShiftAndTrim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub scenes: Vec<Scene>,
    pub strategy: RepairStrategy,

    /// Trim-and-extend passes run before the result became valid or the cap was hit.
    pub passes: usize,
}

/// An issue listed in a [`ContinuitySummary`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContinuityIssue {
    Gap(Gap),
    Overlap(Overlap),
}

/// Aggregated continuity figures for a timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuitySummary {
    pub scene_count: usize,
    pub total_duration: f64,
    pub is_continuous: bool,
    pub gap_count: usize,
    pub overlap_count: usize,
    pub total_gap_duration: f64,
    pub total_overlap_duration: f64,
    pub issues: Vec<ContinuityIssue>,
}

/// Detects and repairs discontinuities between adjacent scenes.
#[derive(Debug, Clone, Copy)]
pub struct SceneGapValidator {
    tolerance: f64,
}

impl Default for SceneGapValidator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SceneGapValidator {
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

    /// Check structure, then report gaps and overlaps using the default tolerance.
    pub fn validate(&self, scenes: &[Scene]) -> CadenceResult<ContinuityReport> {
        self.validate_with_tolerance(scenes, self.tolerance)
    }

    pub fn validate_with_tolerance(
        &self,
        scenes: &[Scene],
        tolerance: f64,
    ) -> CadenceResult<ContinuityReport> {
        ensure_positive("tolerance", tolerance)?;
        for (index, scene) in scenes.iter().enumerate() {
            scene.check(index, tolerance)?;
        }

        let (first, last) = match (scenes.first(), scenes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Ok(ContinuityReport {
                    is_valid: true,
                    ..ContinuityReport::default()
                })
            }
        };

        let mut gaps = Vec::new();
        let mut overlaps = Vec::new();
        for (i, pair) in scenes.windows(2).enumerate() {
            let (current, next) = (&pair[0], &pair[1]);
            let gap = next.start_time - current.end_time;
            if gap > tolerance {
                gaps.push(Gap {
                    after_scene: i,
                    gap_start: current.end_time,
                    gap_end: next.start_time,
                    gap_duration: gap,
                });
            } else if gap < -tolerance {
                overlaps.push(Overlap {
                    scene1: i,
                    scene2: i + 1,
                    overlap_start: next.start_time,
                    overlap_end: current.end_time,
                    overlap_duration: gap.abs(),
                });
            }
        }

        Ok(ContinuityReport {
            is_valid: gaps.is_empty() && overlaps.is_empty(),
            gaps,
            overlaps,
            total_duration: last.end_time - first.start_time,
        })
    }

    /// Close each gap by stretching the earlier scene to meet the next.
    ///
    /// When the stretched scene is still shorter than `min_duration`, it is
    /// lengthened by the shortfall and every later scene moves by the same amount.
    pub fn fix_gaps_extend_previous(
        &self,
        scenes: &[Scene],
        min_duration: Option<f64>,
    ) -> Vec<Scene> {
        let mut fixed = scenes.to_vec();
        for i in 0..fixed.len().saturating_sub(1) {
            let next_start = fixed[i + 1].start_time;
            if next_start - fixed[i].end_time <= self.tolerance {
                continue;
            }

            fixed[i] = fixed[i].with_end(next_start);

            if let Some(min) = min_duration {
                let shortfall = min - fixed[i].duration;
                if shortfall > 0.0 {
                    fixed[i] = Scene::starting_at(fixed[i].start_time, min);
                    for later in fixed.iter_mut().skip(i + 1) {
                        *later = later.shifted(shortfall);
                    }
                }
            }
        }
        fixed
    }

    /// Close each gap by moving the later scene back onto its predecessor.
    pub fn fix_gaps_shift_following(&self, scenes: &[Scene]) -> Vec<Scene> {
        let mut fixed = scenes.to_vec();
        for i in 1..fixed.len() {
            let gap = fixed[i].start_time - fixed[i - 1].end_time;
            if gap > self.tolerance {
                fixed[i] = fixed[i].shifted(-gap);
            }
        }
        fixed
    }

    /// Resolve each overlap by cutting the earlier scene at the next start.
    ///
    /// A scene cut to nothing keeps [`MIN_TRIMMED_SCENE_SECS`] and may still
    /// overlap its successor.
    pub fn fix_overlaps_trim_previous(&self, scenes: &[Scene]) -> Vec<Scene> {
        let mut fixed = scenes.to_vec();
        for i in 0..fixed.len().saturating_sub(1) {
            let next_start = fixed[i + 1].start_time;
            if fixed[i].end_time - next_start <= self.tolerance {
                continue;
            }

            let trimmed = fixed[i].with_end(next_start);
            fixed[i] = if trimmed.duration <= 0.0 {
                tracing::warn!(
                    scene = i,
                    floor_secs = MIN_TRIMMED_SCENE_SECS,
                    "Overlap trim erased scene, applying minimum duration"
                );
                Scene::starting_at(trimmed.start_time, MIN_TRIMMED_SCENE_SECS)
            } else {
                trimmed
            };
        }
        fixed
    }

    /// Repair every gap and overlap, or fail.
    ///
    /// Runs up to [`MAX_REPAIR_PASSES`] rounds of trim-overlaps then
    /// extend-gaps. If the timeline is still discontinuous, retries from the
    /// original input with shift-following then trim-overlaps. A timeline
    /// neither strategy can fix yields `InvalidState`.
    pub fn fix_all_timing_issues(
        &self,
        scenes: &[Scene],
        min_duration: Option<f64>,
    ) -> CadenceResult<RepairOutcome> {
        let initial = self.validate(scenes)?;
        if initial.is_valid {
            return Ok(RepairOutcome {
                scenes: scenes.to_vec(),
                strategy: RepairStrategy::Unchanged,
                passes: 0,
            });
        }

        let mut current = scenes.to_vec();
        let mut report = initial;
        for pass in 1..=MAX_REPAIR_PASSES {
            current = self.fix_overlaps_trim_previous(&current);
            current = self.fix_gaps_extend_previous(&current, min_duration);
            report = self.validate(&current)?;
            if report.is_valid {
                tracing::debug!(passes = pass, "Timeline repaired by trim and extend");
                return Ok(RepairOutcome {
                    scenes: current,
                    strategy: RepairStrategy::TrimAndExtend,
                    passes: pass,
                });
            }
        }

        tracing::warn!(
            gaps = report.gaps.len(),
            overlaps = report.overlaps.len(),
            "Trim and extend did not converge, shifting scenes instead"
        );

        let shifted = self.fix_gaps_shift_following(scenes);
        let fallback = self.fix_overlaps_trim_previous(&shifted);
        let fallback_report = self.validate(&fallback)?;
        if fallback_report.is_valid {
            return Ok(RepairOutcome {
                scenes: fallback,
                strategy: RepairStrategy::ShiftAndTrim,
                passes: MAX_REPAIR_PASSES,
            });
        }

        Err(CadenceError::invalid_state(format!(
            "timeline still discontinuous after {MAX_REPAIR_PASSES} repair passes and shift fallback: {}",
            fallback_report.message()
        )))
    }

    /// Rescale scene durations so they sum to `target`.
    ///
    /// Scenes are re-laid back to back from the first scene's start and the
    /// last scene absorbs the rounding residual.
    pub fn enforce_total_duration(&self, scenes: &[Scene], target: f64) -> CadenceResult<Vec<Scene>> {
        ensure_positive("target duration", target)?;
        for (index, scene) in scenes.iter().enumerate() {
            scene.check(index, self.tolerance)?;
        }
        let current_total = total_scene_duration(scenes);
        if current_total <= 0.0 || !current_total.is_finite() {
            return Err(CadenceError::invalid_state(format!(
                "cannot rescale a timeline whose total duration is {current_total}"
            )));
        }

        let factor = target / current_total;
        let origin = scenes.first().map(|s| s.start_time).unwrap_or(0.0);
        let mut durations: Vec<f64> = scenes.iter().map(|s| s.duration * factor).collect();
        crate::scene_timing::fold_residual(&mut durations, target);

        tracing::debug!(
            current_total,
            target,
            factor,
            "Rescaling timeline to target duration"
        );
        Ok(Scene::contiguous(&durations, origin))
    }

    /// Counts and totals of every gap and overlap.
    pub fn continuity_summary(&self, scenes: &[Scene]) -> CadenceResult<ContinuitySummary> {
        let report = self.validate(scenes)?;
        let issues = report
            .gaps
            .iter()
            .copied()
            .map(ContinuityIssue::Gap)
            .chain(report.overlaps.iter().copied().map(ContinuityIssue::Overlap))
            .collect();

        Ok(ContinuitySummary {
            scene_count: scenes.len(),
            total_duration: report.total_duration,
            is_continuous: report.is_valid,
            gap_count: report.gaps.len(),
            overlap_count: report.overlaps.len(),
            total_gap_duration: report.gaps.iter().map(|g| g.gap_duration).sum(),
            total_overlap_duration: report.overlaps.iter().map(|o| o.overlap_duration).sum(),
            issues,
        })
    }
}
