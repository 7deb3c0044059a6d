//! Scenes, timelines, and continuity reports.

use serde::{Deserialize, Serialize};

use cadence_common::error::{CadenceError, CadenceResult, SceneField};

/// A positioned span of the output timeline.
///
/// Invariants checked by [`Scene::check`]: `end_time > start_time`,
/// `duration > 0`, `start_time >= 0`, and `duration` matches
/// `end_time - start_time` within tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

impl Scene {
    /// Scene spanning `[start_time, end_time]`.
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
            duration: end_time - start_time,
        }
    }

    /// Scene of `duration` seconds starting at `start_time`.
    pub fn starting_at(start_time: f64, duration: f64) -> Self {
        Self {
            start_time,
            end_time: start_time + duration,
            duration,
        }
    }

    /// Lay `durations` end to end starting at `start`.
    pub fn contiguous(durations: &[f64], start: f64) -> Vec<Scene> {
        let mut cursor = start;
        durations
            .iter()
            .map(|&duration| {
                let scene = Scene::starting_at(cursor, duration);
                cursor = scene.end_time;
                scene
            })
            .collect()
    }

    /// Copy of this scene moved by `offset` seconds, duration unchanged.
    pub fn shifted(&self, offset: f64) -> Scene {
        Scene {
            start_time: self.start_time + offset,
            end_time: self.end_time + offset,
            duration: self.duration,
        }
    }

    /// Copy of this scene with a new end time and recomputed duration.
    pub fn with_end(&self, end_time: f64) -> Scene {
        Scene::new(self.start_time, end_time)
    }

    /// Structural check for the scene at position `index` in its timeline.
    pub fn check(&self, index: usize, tolerance: f64) -> CadenceResult<()> {
        if !self.start_time.is_finite() {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::StartTime,
                "start_time is not finite",
            ));
        }
        if !self.end_time.is_finite() {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::EndTime,
                "end_time is not finite",
            ));
        }
        if !self.duration.is_finite() {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::Duration,
                "duration is not finite",
            ));
        }
        if self.start_time < 0.0 {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::StartTime,
                format!("start_time {} is negative", self.start_time),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::EndTime,
                format!(
                    "end_time {} is not after start_time {}",
                    self.end_time, self.start_time
                ),
            ));
        }
        if self.duration <= 0.0 {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::Duration,
                format!("duration {} is not positive", self.duration),
            ));
        }
        let span = self.end_time - self.start_time;
        if (self.duration - span).abs() > tolerance {
            return Err(CadenceError::invalid_scene(
                index,
                SceneField::Duration,
                format!(
                    "duration {} does not match end_time - start_time ({span})",
                    self.duration
                ),
            ));
        }
        Ok(())
    }
}

/// Sum of scene durations.
pub fn total_scene_duration(scenes: &[Scene]) -> f64 {
    scenes.iter().map(|s| s.duration).sum()
}

/// Uncovered interval between two adjacent scenes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    /// Index of the scene the gap follows.
    pub after_scene: usize,
    pub gap_start: f64,
    pub gap_end: f64,
    pub gap_duration: f64,
}

/// Doubly covered interval between two adjacent scenes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub scene1: usize,
    pub scene2: usize,
    pub overlap_start: f64,
    pub overlap_end: f64,
    pub overlap_duration: f64,
}

/// Result of a continuity check over a timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinuityReport {
    pub is_valid: bool,
    pub gaps: Vec<Gap>,
    pub overlaps: Vec<Overlap>,

    /// `last.end_time - first.start_time`, or 0 for an empty timeline.
    pub total_duration: f64,
}

impl ContinuityReport {
    pub fn message(&self) -> String {
        if self.is_valid {
            "Valid continuity".to_string()
        } else {
            format!(
                "{} gaps, {} overlaps detected",
                self.gaps.len(),
                self.overlaps.len()
            )
        }
    }

    pub fn issue_count(&self) -> usize {
        self.gaps.len() + self.overlaps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_layout() {
        let scenes = Scene::contiguous(&[10.0, 13.0, 15.0], 2.0);
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0], Scene::new(2.0, 12.0));
        assert_eq!(scenes[1].start_time, 12.0);
        assert_eq!(scenes[2].end_time, 40.0);
    }

    #[test]
    fn test_check_rejects_end_before_start() {
        let scene = Scene {
            start_time: 5.0,
            end_time: 4.0,
            duration: 1.0,
        };
        let err = scene.check(3, 0.001).unwrap_err();
        assert!(matches!(
            err,
            CadenceError::InvalidScene {
                index: 3,
                field: SceneField::EndTime,
                ..
            }
        ));
    }

    #[test]
    fn test_check_rejects_duration_mismatch() {
        let scene = Scene {
            start_time: 0.0,
            end_time: 10.0,
            duration: 9.5,
        };
        assert!(matches!(
            scene.check(0, 0.001),
            Err(CadenceError::InvalidScene {
                field: SceneField::Duration,
                ..
            })
        ));
    }

    #[test]
    fn test_check_rejects_negative_start() {
        let scene = Scene::new(-1.0, 2.0);
        assert!(matches!(
            scene.check(0, 0.001),
            Err(CadenceError::InvalidScene {
                field: SceneField::StartTime,
                ..
            })
        ));
    }

    #[test]
    fn test_report_message() {
        let report = ContinuityReport {
            is_valid: false,
            gaps: vec![Gap {
                after_scene: 0,
                gap_start: 10.0,
                gap_end: 12.0,
                gap_duration: 2.0,
            }],
            overlaps: vec![],
            total_duration: 45.0,
        };
        assert_eq!(report.message(), "1 gaps, 0 overlaps detected");
        assert_eq!(ContinuityReport { is_valid: true, ..report }.message(), "Valid continuity");
    }
}
