//! Scene duration distribution.
//!
//! Splits a master duration (normally the narration length) into per-scene
//! durations. The unconstrained split tracks the ideal cumulative boundary
//! `total * k / n` at every prefix, so rounding error never accumulates
//! across scenes, and the final scene absorbs whatever residual remains.

use serde::{Deserialize, Serialize};

use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::tolerance::{ensure_positive, DEFAULT_TOLERANCE};
use cadence_timeline_model::scene::Scene;

/// Upper bound on the number of scenes a constrained split may produce.
pub const MAX_DISTRIBUTED_SCENES: usize = 100_000;

/// Optional per-scene bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationConstraints {
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
}

impl DurationConstraints {
    pub const NONE: DurationConstraints = DurationConstraints {
        min_duration: None,
        max_duration: None,
    };

    pub fn new(min_duration: Option<f64>, max_duration: Option<f64>) -> Self {
        Self {
            min_duration,
            max_duration,
        }
    }

    /// Bounds must be finite, positive, and ordered.
    pub fn validate(&self) -> CadenceResult<()> {
        if let Some(min) = self.min_duration {
            ensure_positive("min_duration", min)?;
        }
        if let Some(max) = self.max_duration {
            ensure_positive("max_duration", max)?;
        }
        if let (Some(min), Some(max)) = (self.min_duration, self.max_duration) {
            if min > max {
                return Err(CadenceError::invalid_argument(format!(
                    "min_duration ({min}) exceeds max_duration ({max})"
                )));
            }
        }
        Ok(())
    }
}

/// One scene's deviation from the unconstrained even split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneDeviation {
    pub scene: usize,
    pub amount: f64,
}

/// Per-call diagnostics for a distribution.
///
/// Deviations are measured against `total / requested_scene_count`.
/// Scenes appended by a constraint are compared against the same baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub baseline: f64,

    /// Signed `duration - baseline` for every returned scene.
    pub deviations: Vec<f64>,

    /// Scenes shorter than the baseline by more than the tolerance.
    pub deficits: Vec<SceneDeviation>,

    /// Scenes longer than the baseline by more than the tolerance.
    pub surpluses: Vec<SceneDeviation>,
    pub total_deficit: f64,
    pub total_surplus: f64,

    /// The constraint that changed the scene count, if any.
    pub constraint_applied: Option<AppliedConstraint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedConstraint {
    Minimum,
    Maximum,
}

/// Boundary between consecutive scenes that is not flush.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryGap {
    pub after_scene: usize,
    pub gap_duration: f64,
}

/// Durations plus their absolute placement on a timeline starting at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTiming {
    pub durations: Vec<f64>,
    pub scenes: Vec<Scene>,
    pub gaps_detected: Vec<BoundaryGap>,
    pub total_duration: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DistributionReport>,
}

/// Stateless scene duration calculator.
#[derive(Debug, Clone, Copy)]
pub struct SceneTimingCalculator {
    tolerance: f64,
}

impl Default for SceneTimingCalculator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SceneTimingCalculator {
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

    /// Split `total` seconds into `scene_count` scene durations.
    ///
    /// A `min_duration` that the even split would violate reduces the scene
    /// count to `ceil(total / min)`. A `max_duration` the even split would
    /// exceed caps every scene and appends scenes until `total` is covered.
    pub fn distribute(
        &self,
        total: f64,
        scene_count: usize,
        constraints: &DurationConstraints,
    ) -> CadenceResult<Vec<f64>> {
        self.distribute_inner(total, scene_count, constraints)
            .map(|(durations, _)| durations)
    }

    /// Like [`distribute`](Self::distribute), also returning deviation diagnostics.
    /// The durations are identical to the untracked call.
    pub fn distribute_tracked(
        &self,
        total: f64,
        scene_count: usize,
        constraints: &DurationConstraints,
    ) -> CadenceResult<(Vec<f64>, DistributionReport)> {
        let (durations, applied) = self.distribute_inner(total, scene_count, constraints)?;
        let report = self.build_report(total / scene_count as f64, &durations, applied);
        Ok((durations, report))
    }

    /// Split `total` proportionally to `weights`.
    pub fn distribute_weighted(&self, total: f64, weights: &[f64]) -> CadenceResult<Vec<f64>> {
        ensure_positive("total duration", total)?;
        if weights.is_empty() {
            return Err(CadenceError::invalid_argument("weights must not be empty"));
        }
        for (i, &w) in weights.iter().enumerate() {
            ensure_positive(&format!("weight[{i}]"), w)?;
        }

        let total_weight: f64 = weights.iter().sum();
        let mut durations: Vec<f64> = weights.iter().map(|w| w / total_weight * total).collect();
        fold_residual(&mut durations, total);
        Ok(durations)
    }

    /// Distribute and place scenes back to back from time zero.
    pub fn calculate_scene_timing(
        &self,
        total: f64,
        scene_count: usize,
        constraints: &DurationConstraints,
        track: bool,
    ) -> CadenceResult<SceneTiming> {
        let (durations, report) = if track {
            let (durations, report) = self.distribute_tracked(total, scene_count, constraints)?;
            (durations, Some(report))
        } else {
            (self.distribute(total, scene_count, constraints)?, None)
        };

        let scenes = Scene::contiguous(&durations, 0.0);
        let gaps_detected = scenes
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| {
                let gap = pair[1].start_time - pair[0].end_time;
                (gap.abs() > self.tolerance).then_some(BoundaryGap {
                    after_scene: i,
                    gap_duration: gap,
                })
            })
            .collect();

        Ok(SceneTiming {
            total_duration: durations.iter().sum(),
            durations,
            scenes,
            gaps_detected,
            report,
        })
    }

    fn distribute_inner(
        &self,
        total: f64,
        scene_count: usize,
        constraints: &DurationConstraints,
    ) -> CadenceResult<(Vec<f64>, Option<AppliedConstraint>)> {
        ensure_positive("total duration", total)?;
        if scene_count == 0 {
            return Err(CadenceError::invalid_argument(
                "scene count must be greater than zero",
            ));
        }
        constraints.validate()?;

        let base = total / scene_count as f64;

        if let Some(min) = constraints.min_duration {
            if base < min {
                let adjusted = ((total / min).ceil() as usize).max(1);
                tracing::debug!(
                    requested = scene_count,
                    adjusted,
                    min_duration = min,
                    "Minimum scene duration reduces scene count"
                );
                return Ok((
                    self.with_minimum(total, adjusted, min)?,
                    Some(AppliedConstraint::Minimum),
                ));
            }
        }

        if let Some(max) = constraints.max_duration {
            if base > max {
                let durations = self.with_maximum(total, scene_count, max)?;
                tracing::debug!(
                    requested = scene_count,
                    adjusted = durations.len(),
                    max_duration = max,
                    "Maximum scene duration adds scenes"
                );
                return Ok((durations, Some(AppliedConstraint::Maximum)));
            }
        }

        Ok((even_split(total, scene_count), None))
    }

    fn with_minimum(&self, total: f64, scene_count: usize, min: f64) -> CadenceResult<Vec<f64>> {
        ensure_scene_budget(scene_count)?;
        let mut durations = vec![min; scene_count];
        let surplus = total - min * scene_count as f64;
        if surplus >= 0.0 {
            let bonus = surplus / scene_count as f64;
            durations.iter_mut().for_each(|d| *d += bonus);
            fold_residual(&mut durations, total);
        }
        Ok(durations)
    }

    fn with_maximum(&self, total: f64, scene_count: usize, max: f64) -> CadenceResult<Vec<f64>> {
        ensure_scene_budget(scene_count)?;
        let mut durations = vec![max; scene_count];
        let mut remaining = total - max * scene_count as f64;
        while remaining > self.tolerance {
            ensure_scene_budget(durations.len() + 1)?;
            let next = remaining.min(max);
            durations.push(next);
            remaining -= next;
        }
        fold_residual(&mut durations, total);
        Ok(durations)
    }

    fn build_report(
        &self,
        baseline: f64,
        durations: &[f64],
        constraint_applied: Option<AppliedConstraint>,
    ) -> DistributionReport {
        let deviations: Vec<f64> = durations.iter().map(|d| d - baseline).collect();
        let mut report = DistributionReport {
            baseline,
            constraint_applied,
            ..DistributionReport::default()
        };

        for (scene, &dev) in deviations.iter().enumerate() {
            if dev < -self.tolerance {
                report.deficits.push(SceneDeviation { scene, amount: -dev });
                report.total_deficit += -dev;
            } else if dev > self.tolerance {
                report.surpluses.push(SceneDeviation { scene, amount: dev });
                report.total_surplus += dev;
            }
        }
        report.deviations = deviations;
        report
    }
}

/// Unconstrained split whose prefix sums follow `total * k / n`.
fn even_split(total: f64, scene_count: usize) -> Vec<f64> {
    let n = scene_count as f64;
    let mut durations = Vec::with_capacity(scene_count);
    let mut running = 0.0;
    for i in 0..scene_count {
        let ideal = total * (i + 1) as f64 / n;
        let duration = ideal - running;
        durations.push(duration);
        running += duration;
    }
    fold_residual(&mut durations, total);
    durations
}

/// Add `total - sum(durations)` to the last entry.
pub(crate) fn fold_residual(durations: &mut [f64], total: f64) {
    let sum: f64 = durations.iter().sum();
    if let Some(last) = durations.last_mut() {
        *last += total - sum;
    }
}

fn ensure_scene_budget(count: usize) -> CadenceResult<()> {
    if count > MAX_DISTRIBUTED_SCENES {
        return Err(CadenceError::invalid_argument(format!(
            "constraint would produce more than {MAX_DISTRIBUTED_SCENES} scenes"
        )));
    }
    Ok(())
}
