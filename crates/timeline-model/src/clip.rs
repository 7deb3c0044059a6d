//! Clip handles and duration edits.
//!
//! The timing engine never touches media. It works against the [`MediaClip`]
//! trait, and the assembly pipeline supplies [`ClipPlan`], which records each
//! operation as a [`ClipEdit`] for the compositor to realize later.

use serde::{Deserialize, Serialize};

use cadence_common::error::{CadenceError, CadenceResult};
use cadence_common::tolerance::{ensure_non_negative, ensure_positive, DEFAULT_TOLERANCE};

/// What fills the extra time when a clip is extended past its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionFill {
    FreezeLastFrame,
    Black,
}

/// A handle on timed media whose duration can be changed.
///
/// Every operation returns a new handle and leaves `self` untouched.
pub trait MediaClip: Sized {
    /// Current duration in seconds.
    fn duration(&self) -> f64;

    /// Force the duration to exactly `duration` seconds.
    fn with_duration(&self, duration: f64) -> CadenceResult<Self>;

    /// Keep only `[start, end]` of the current content.
    fn subclip(&self, start: f64, end: f64) -> CadenceResult<Self>;

    /// Repeat the content until it lasts `duration` seconds.
    fn looped(&self, duration: f64) -> CadenceResult<Self>;

    /// Play back `factor` times faster. The new duration is `duration / factor`.
    fn time_scaled(&self, factor: f64) -> CadenceResult<Self>;

    /// Append `secs` seconds of `fill` after the content.
    fn extended(&self, fill: ExtensionFill, secs: f64) -> CadenceResult<Self>;
}

/// A single recorded duration edit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipEdit {
    SetDuration { secs: f64 },
    Subclip { start: f64, end: f64 },
    Loop { duration: f64 },
    TimeScale { factor: f64 },
    Extend { fill: ExtensionFill, secs: f64 },
}

/// A video source plus the ordered edits that bring it to its target length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPlan {
    /// Path or URL of the source media.
    pub locator: String,

    /// Probed duration of the untouched source.
    pub source_duration: f64,

    /// Effective duration after all edits.
    pub duration: f64,

    pub edits: Vec<ClipEdit>,
}

impl ClipPlan {
    pub fn new(locator: impl Into<String>, source_duration: f64) -> CadenceResult<Self> {
        let source_duration = ensure_positive("source duration", source_duration)?;
        Ok(Self {
            locator: locator.into(),
            source_duration,
            duration: source_duration,
            edits: Vec::new(),
        })
    }

    fn push(&self, edit: ClipEdit, duration: f64) -> Self {
        let mut next = self.clone();
        next.edits.push(edit);
        next.duration = duration;
        next
    }

    /// True when no edit has been recorded.
    pub fn is_untouched(&self) -> bool {
        self.edits.is_empty()
    }
}

impl MediaClip for ClipPlan {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn with_duration(&self, duration: f64) -> CadenceResult<Self> {
        let secs = ensure_positive("clip duration", duration)?;
        Ok(self.push(ClipEdit::SetDuration { secs }, secs))
    }

    fn subclip(&self, start: f64, end: f64) -> CadenceResult<Self> {
        ensure_non_negative("subclip start", start)?;
        if !end.is_finite() || end <= start {
            return Err(CadenceError::invalid_argument(format!(
                "subclip end {end} must be after start {start}"
            )));
        }
        if end > self.duration + DEFAULT_TOLERANCE {
            return Err(CadenceError::invalid_argument(format!(
                "subclip end {end} exceeds clip duration {}",
                self.duration
            )));
        }
        Ok(self.push(ClipEdit::Subclip { start, end }, end - start))
    }

    fn looped(&self, duration: f64) -> CadenceResult<Self> {
        let duration = ensure_positive("loop duration", duration)?;
        Ok(self.push(ClipEdit::Loop { duration }, duration))
    }

    fn time_scaled(&self, factor: f64) -> CadenceResult<Self> {
        let factor = ensure_positive("speed factor", factor)?;
        Ok(self.push(ClipEdit::TimeScale { factor }, self.duration / factor))
    }

    fn extended(&self, fill: ExtensionFill, secs: f64) -> CadenceResult<Self> {
        let secs = ensure_non_negative("extension", secs)?;
        Ok(self.push(ClipEdit::Extend { fill, secs }, self.duration + secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_do_not_mutate_input() {
        let clip = ClipPlan::new("a.mp4", 12.0).unwrap();
        let trimmed = clip.subclip(0.0, 8.0).unwrap();
        assert_eq!(clip.duration(), 12.0);
        assert!(clip.is_untouched());
        assert_eq!(trimmed.duration(), 8.0);
        assert_eq!(trimmed.edits, vec![ClipEdit::Subclip { start: 0.0, end: 8.0 }]);
    }

    #[test]
    fn test_time_scaled_divides_duration() {
        let clip = ClipPlan::new("a.mp4", 10.0).unwrap();
        let faster = clip.time_scaled(2.0).unwrap();
        assert!((faster.duration() - 5.0).abs() < 1e-12);
        let slower = clip.time_scaled(0.5).unwrap();
        assert!((slower.duration() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_extended_adds_time() {
        let clip = ClipPlan::new("a.mp4", 4.0).unwrap();
        let padded = clip.extended(ExtensionFill::Black, 1.5).unwrap();
        assert_eq!(padded.duration(), 5.5);
        assert_eq!(padded.source_duration, 4.0);
    }

    #[test]
    fn test_invalid_operations_are_rejected() {
        let clip = ClipPlan::new("a.mp4", 4.0).unwrap();
        assert!(clip.subclip(1.0, 0.5).is_err());
        assert!(clip.subclip(0.0, 6.0).is_err());
        assert!(clip.time_scaled(0.0).is_err());
        assert!(clip.with_duration(-1.0).is_err());
        assert!(ClipPlan::new("a.mp4", 0.0).is_err());
    }

    #[test]
    fn test_edits_serialize_with_kind_tag() {
        let edit = ClipEdit::Extend {
            fill: ExtensionFill::FreezeLastFrame,
            secs: 2.0,
        };
        let json = serde_json::to_string(&edit).unwrap();
        assert_eq!(json, r#"{"kind":"extend","fill":"freeze_last_frame","secs":2.0}"#);
    }
}
