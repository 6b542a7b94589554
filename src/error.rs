use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type PilotResult<T> = Result<T, PilotError>;
pub type DriverResult<T> = Result<T, DriverError>;

/// Conditions that abort a run.
///
/// Everything recoverable (a missing optional indicator, an unverified
/// drawing, an expired suppression budget) is reported through outcome types
/// instead and never surfaces here.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("preset file not found: {path}")]
    PresetFileNotFound { path: PathBuf },

    #[error("preset not found: {name}")]
    PresetNotFound { name: String },

    #[error("invalid preset file {path}: {reason}")]
    InvalidPreset { path: PathBuf, reason: String },

    #[error("drawing tool `{tool}` could not be selected by any tier")]
    ToolSelectionFailed { tool: String },

    #[error("plot surface did not become visible within {timeout:?}")]
    PlotSurfaceUnavailable { timeout: Duration },

    #[error("critical action `{target}` failed: {reason}")]
    CriticalActionFailed { target: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid drawing state transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a [`crate::driver::Page`] implementation.
///
/// Most of these are triggers for fallback logic one layer up rather than
/// terminal conditions.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element `{selector}` is covered by another element")]
    Intercepted { selector: String },

    #[error("element `{selector}` is not interactable: {reason}")]
    NotInteractable { selector: String, reason: String },

    #[error("element `{selector}` is no longer attached")]
    Detached { selector: String },

    #[error("operation `{operation}` is not supported by this page backend")]
    Unsupported { operation: &'static str },

    #[error("operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// `true` for failures where retrying through another input modality
    /// is likely to help.
    #[must_use]
    pub fn is_interaction_failure(&self) -> bool {
        matches!(
            self,
            Self::Intercepted { .. }
                | Self::NotInteractable { .. }
                | Self::Detached { .. }
                | Self::Timeout { .. }
        )
    }
}
