//! chart-pilot: resilient UI-interaction engine for API-less web charts.
//!
//! The crate drives a charting web application through its visual UI:
//! multi-strategy element resolution, actions with fallback input
//! modalities, time-boxed interstitial suppression and a price-to-pixel
//! mapper for placing drawings. Everything talks to the browser through the
//! [`driver::Page`] seam.

pub mod api;
pub mod core;
pub mod driver;
pub mod error;
pub mod extensions;
pub mod interaction;
pub mod telemetry;

pub use api::{ChartPilot, PilotConfig, UiProfile};
pub use error::{DriverError, PilotError, PilotResult};
