mod action_executor;
mod capture_orchestrator;
mod chart_context;
mod coordinate_mapper;
mod drawing_controller;
mod interstitial_suppressor;
mod locator_resolver;
mod outcome;
mod pilot_config;
mod preset_applier;
mod ui_profile;

pub use action_executor::{ActionEffect, ActionExecutor, ActionRequest};
pub use capture_orchestrator::{
    CaptureReport, CaptureRequest, ChartPilot, DrawingSpec, PresetSelection,
};
pub use chart_context::{ChartContext, SymbolTier, TimeframeTier};
pub use coordinate_mapper::CoordinateMapper;
pub use drawing_controller::{
    Direction, DrawingController, DrawingReport, DrawingRequest, DrawingTarget, GestureMode,
    ToolTier,
};
pub use interstitial_suppressor::{
    InterstitialSuppressor, PopupBudget, SuppressionMode, SuppressionReport, Tactic,
};
pub use locator_resolver::{LocatorResolver, Resolution};
pub use outcome::{
    ActionOutcome, ErrorKind, FailureStage, Modality, RecoverableFailure, ResultEnvelope,
};
pub use pilot_config::{
    ENV_HEADLESS, ENV_PRESET_PATH, ENV_STORAGE_STATE, ENV_SUPPRESS_BUDGET_MS,
    ExecutorCapabilities, OverlaySuppression, PilotConfig, Timings,
};
pub use preset_applier::{ParamsReport, PresetApplier, PresetReport, load_preset};
pub use ui_profile::{PopupProfile, UiProfile};
