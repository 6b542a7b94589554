//! Optional hooks around a run.
//!
//! Keep extensions out of the interaction core; the orchestrator only sees
//! the trait.

pub mod annotation;

pub use annotation::{AnnotationRequest, ScreenshotAnnotator, SidecarAnnotator, TradeSide};
