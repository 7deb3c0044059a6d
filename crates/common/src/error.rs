//! Error types shared across Cadence crates.

use std::fmt;
use std::path::PathBuf;

/// Scene field that failed a structural check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneField {
    StartTime,
    EndTime,
    Duration,
}

impl fmt::Display for SceneField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SceneField::StartTime => "start_time",
            SceneField::EndTime => "end_time",
            SceneField::Duration => "duration",
        };
        f.write_str(name)
    }
}

/// Top-level error type for Cadence operations.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invalid scene {index} ({field}): {message}")]
    InvalidScene {
        index: usize,
        field: SceneField,
        message: String,
    },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Failed to read media '{locator}': {message}")]
    MediaRead { locator: String, message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<CadenceError>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CadenceError.
pub type CadenceResult<T> = Result<T, CadenceError>;

impl CadenceError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    pub fn invalid_scene(index: usize, field: SceneField, msg: impl Into<String>) -> Self {
        Self::InvalidScene {
            index,
            field,
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn media_read(locator: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MediaRead {
            locator: locator.into(),
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Attach the name of the pipeline stage this error surfaced in.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error with all stage context removed.
    pub fn root(&self) -> &CadenceError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the outermost stage, if the error carries stage context.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_preserves_root() {
        let err = CadenceError::invalid_argument("total must be positive").in_stage("scene_timing");
        assert_eq!(err.stage(), Some("scene_timing"));
        assert!(matches!(err.root(), CadenceError::InvalidArgument { .. }));
        assert!(err.to_string().contains("scene_timing"));
        assert!(err.to_string().contains("total must be positive"));
    }

    #[test]
    fn test_invalid_scene_display_names_field() {
        let err = CadenceError::invalid_scene(2, SceneField::EndTime, "end before start");
        assert_eq!(
            err.to_string(),
            "Invalid scene 2 (end_time): end before start"
        );
    }
}
