use serde::{Deserialize, Serialize};

use crate::error::{PilotError, PilotResult};

/// Phase of one drawing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawingPhase {
    Idle,
    ToolSelecting,
    ToolSelected,
    Dragging,
    Verifying,
    /// One jittered re-drag after a failed verification.
    Retrying,
    Done,
}

impl DrawingPhase {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ToolSelecting => "tool_selecting",
            Self::ToolSelected => "tool_selected",
            Self::Dragging => "dragging",
            Self::Verifying => "verifying",
            Self::Retrying => "retrying",
            Self::Done => "done",
        }
    }

    /// Whether the machine may move from `self` to `next`.
    #[must_use]
    pub fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::ToolSelecting)
                | (Self::ToolSelecting, Self::ToolSelected)
                | (Self::ToolSelected, Self::Dragging)
                | (Self::Dragging, Self::Verifying)
                | (Self::Verifying, Self::Done | Self::Retrying)
                | (Self::Retrying, Self::Dragging)
        )
    }
}

/// Drawing state machine.
///
/// `Idle -> ToolSelecting -> ToolSelected -> Dragging -> Verifying`, then
/// either `Done` or a single `Retrying -> Dragging -> Verifying` round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawingState {
    phase: DrawingPhase,
    retries_used: u32,
    max_retries: u32,
}

impl Default for DrawingState {
    fn default() -> Self {
        Self::new(1)
    }
}

impl DrawingState {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            phase: DrawingPhase::Idle,
            retries_used: 0,
            max_retries,
        }
    }

    #[must_use]
    pub fn phase(self) -> DrawingPhase {
        self.phase
    }

    #[must_use]
    pub fn retries_used(self) -> u32 {
        self.retries_used
    }

    #[must_use]
    pub fn can_retry(self) -> bool {
        self.phase == DrawingPhase::Verifying && self.retries_used < self.max_retries
    }

    #[must_use]
    pub fn is_done(self) -> bool {
        self.phase == DrawingPhase::Done
    }

    pub fn transition(&mut self, next: DrawingPhase) -> PilotResult<()> {
        let exhausted = next == DrawingPhase::Retrying && self.retries_used >= self.max_retries;
        if !self.phase.allows(next) || exhausted {
            return Err(PilotError::InvalidTransition {
                from: self.phase.name(),
                to: next.name(),
            });
        }
        if next == DrawingPhase::Retrying {
            self.retries_used += 1;
        }
        self.phase = next;
        Ok(())
    }

    pub fn begin_tool_selection(&mut self) -> PilotResult<()> {
        self.transition(DrawingPhase::ToolSelecting)
    }

    pub fn tool_selected(&mut self) -> PilotResult<()> {
        self.transition(DrawingPhase::ToolSelected)
    }

    pub fn begin_drag(&mut self) -> PilotResult<()> {
        self.transition(DrawingPhase::Dragging)
    }

    pub fn begin_verification(&mut self) -> PilotResult<()> {
        self.transition(DrawingPhase::Verifying)
    }

    pub fn retry(&mut self) -> PilotResult<()> {
        self.transition(DrawingPhase::Retrying)
    }

    pub fn finish(&mut self) -> PilotResult<()> {
        self.transition(DrawingPhase::Done)
    }
}
