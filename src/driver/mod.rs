mod sim_page;

#[cfg(feature = "cdp-backend")]
mod cdp_page;

pub use sim_page::{SimDom, SimElement, SimEvent, SimPage};

#[cfg(feature = "cdp-backend")]
pub use cdp_page::{CdpLaunchOptions, CdpPage};

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{LabelHit, Point, Rect, Viewport};
use crate::error::DriverResult;

/// Reference to one element matched by a query expression.
///
/// Handles are snapshots: `(selector, index)` identifies the element again
/// on the page, and an element that disappeared in the meantime surfaces as
/// [`crate::error::DriverError::Detached`] when acted upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
    pub text: String,
    pub bounds: Option<Rect>,
    pub visible: bool,
}

impl ElementHandle {
    #[must_use]
    pub fn center(&self) -> Option<Point> {
        self.bounds.map(Rect::center)
    }
}

/// Readiness an element must reach before it counts as resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitState {
    Visible,
    Attached,
}

impl WaitState {
    #[must_use]
    pub fn satisfied_by(self, element: &ElementHandle) -> bool {
        match self {
            Self::Visible => element.visible,
            Self::Attached => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

/// Contract implemented by any live page backend.
///
/// Every operation is a suspension point; callers bound them with their own
/// timeouts. Keys use `"Escape"`, `"Enter"` or chords such as `"Control+K"`.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;
    async fn go_back(&self) -> DriverResult<()>;

    /// All elements currently matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementHandle>>;

    /// Physical pointer click at the element centre.
    async fn click(&self, element: &ElementHandle, button: MouseButton) -> DriverResult<()>;
    /// Synthetic click dispatched on the element itself, bypassing hit testing.
    async fn dispatch_click(&self, element: &ElementHandle) -> DriverResult<()>;
    async fn hover(&self, element: &ElementHandle) -> DriverResult<()>;
    /// Replaces the element's value and fires input/change events.
    async fn fill(&self, element: &ElementHandle, value: &str) -> DriverResult<()>;
    async fn input_value(&self, element: &ElementHandle) -> DriverResult<String>;

    async fn press_key(&self, key: &str) -> DriverResult<()>;
    async fn type_text(&self, text: &str) -> DriverResult<()>;

    async fn mouse_move(&self, to: Point, steps: u32) -> DriverResult<()>;
    async fn mouse_down(&self) -> DriverResult<()>;
    async fn mouse_up(&self) -> DriverResult<()>;
    /// Synthetic pointer event on whatever sits at `at`. Backends without
    /// support return [`crate::error::DriverError::Unsupported`].
    async fn dispatch_pointer(&self, phase: PointerPhase, at: Point) -> DriverResult<()>;

    /// Aborts every later request whose URL contains one of `fragments`.
    async fn block_requests(&self, fragments: &[String]) -> DriverResult<()>;
    /// Script evaluated in every new document before page scripts run.
    async fn add_init_script(&self, script: &str) -> DriverResult<()>;
    async fn add_style(&self, css: &str) -> DriverResult<()>;

    /// Visible text nodes starting with any of `labels`, with their bounds.
    async fn find_text(&self, labels: &[String]) -> DriverResult<Vec<LabelHit>>;

    async fn viewport(&self) -> DriverResult<Viewport>;
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;
}
