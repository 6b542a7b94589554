use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PilotError, PilotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    #[default]
    Sell,
}

/// Payload burned into (or attached to) a saved screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRequest {
    #[serde(default)]
    pub side: TradeSide,
    /// Confidence in `0.0..=1.0`.
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub footer: Option<String>,
}

impl AnnotationRequest {
    #[must_use]
    pub fn new(side: TradeSide, score: f64) -> Self {
        Self {
            side,
            score,
            notes: Vec::new(),
            footer: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    #[must_use]
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Explicit footer, or a UTC timestamp taken at `now`.
    #[must_use]
    pub fn footer_at(&self, now: DateTime<Utc>) -> String {
        self.footer
            .clone()
            .unwrap_or_else(|| now.format("UTC %Y-%m-%d %H:%M:%S").to_string())
    }

    pub fn validate(&self) -> PilotResult<()> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(PilotError::InvalidConfig(format!(
                "annotation score {} outside 0..=1",
                self.score
            )));
        }
        Ok(())
    }
}

/// Post-processing hook run on a saved screenshot.
///
/// Failures are reported back to the run as recoverable; the screenshot
/// itself is kept either way.
pub trait ScreenshotAnnotator: Send + Sync {
    fn id(&self) -> &str;
    fn annotate(&self, screenshot: &Path, request: &AnnotationRequest) -> PilotResult<()>;
}

/// Writes the annotation next to the screenshot as `<file>.annotation.json`
/// for a downstream renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarAnnotator;

#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    screenshot: &'a Path,
    side: TradeSide,
    score: f64,
    notes: &'a [String],
    footer: String,
}

impl SidecarAnnotator {
    #[must_use]
    pub fn sidecar_path(screenshot: &Path) -> PathBuf {
        let mut name = screenshot.as_os_str().to_owned();
        name.push(".annotation.json");
        PathBuf::from(name)
    }
}

impl ScreenshotAnnotator for SidecarAnnotator {
    fn id(&self) -> &str {
        "sidecar"
    }

    fn annotate(&self, screenshot: &Path, request: &AnnotationRequest) -> PilotResult<()> {
        request.validate()?;
        let sidecar = Sidecar {
            screenshot,
            side: request.side,
            score: request.score,
            notes: &request.notes,
            footer: request.footer_at(Utc::now()),
        };
        let path = Self::sidecar_path(screenshot);
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| PilotError::InvalidConfig(format!("annotation payload: {e}")))?;
        std::fs::write(&path, json).map_err(|source| PilotError::Io { path, source })
    }
}
