use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{FallbackDomain, Viewport};
use crate::error::{PilotError, PilotResult};

pub const ENV_STORAGE_STATE: &str = "CHART_PILOT_STORAGE_STATE";
pub const ENV_SUPPRESS_BUDGET_MS: &str = "CHART_PILOT_SUPPRESS_BUDGET_MS";
pub const ENV_PRESET_PATH: &str = "CHART_PILOT_PRESET_PATH";
pub const ENV_HEADLESS: &str = "CHART_PILOT_HEADLESS";

/// Every wait the engine performs, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub per_strategy_timeout_ms: u64,
    pub action_attempt_timeout_ms: u64,
    pub action_retries: u32,
    pub suppress_budget_ms: u64,
    pub health_probe_timeout_ms: u64,
    pub press_move_delay_ms: u64,
    pub drag_steps: u32,
    pub drawing_stabilization_ms: u64,
    pub poll_interval_ms: u64,
    /// Pause after a UI action before the next dependent step.
    pub settle_ms: u64,
    /// Pause after opening the chart or switching symbol.
    pub chart_settle_ms: u64,
    pub plot_surface_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            per_strategy_timeout_ms: 1_000,
            action_attempt_timeout_ms: 1_200,
            action_retries: 2,
            suppress_budget_ms: 800,
            health_probe_timeout_ms: 150,
            press_move_delay_ms: 150,
            drag_steps: 20,
            drawing_stabilization_ms: 2_000,
            poll_interval_ms: 50,
            settle_ms: 250,
            chart_settle_ms: 1_200,
            plot_surface_timeout_ms: 20_000,
        }
    }
}

impl Timings {
    #[must_use]
    pub fn per_strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.per_strategy_timeout_ms)
    }

    #[must_use]
    pub fn action_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.action_attempt_timeout_ms)
    }

    #[must_use]
    pub fn suppress_budget(&self) -> Duration {
        Duration::from_millis(self.suppress_budget_ms)
    }

    #[must_use]
    pub fn health_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health_probe_timeout_ms)
    }

    #[must_use]
    pub fn press_move_delay(&self) -> Duration {
        Duration::from_millis(self.press_move_delay_ms)
    }

    #[must_use]
    pub fn drawing_stabilization(&self) -> Duration {
        Duration::from_millis(self.drawing_stabilization_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn chart_settle(&self) -> Duration {
        Duration::from_millis(self.chart_settle_ms)
    }

    #[must_use]
    pub fn plot_surface_timeout(&self) -> Duration {
        Duration::from_millis(self.plot_surface_timeout_ms)
    }
}

/// Optional rungs of the action fallback ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorCapabilities {
    pub use_synthetic_events: bool,
    pub suppress_between_attempts: bool,
    pub hotkey_fallback: bool,
}

impl Default for ExecutorCapabilities {
    fn default() -> Self {
        Self {
            use_synthetic_events: true,
            suppress_between_attempts: true,
            hotkey_fallback: true,
        }
    }
}

/// How much interstitial handling a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverlaySuppression {
    Disabled,
    /// Network block and observer script only.
    AmbientOnly,
    /// Ambient tactics plus reactive races before actions and screenshots.
    #[default]
    Full,
}

impl OverlaySuppression {
    #[must_use]
    pub fn ambient(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    #[must_use]
    pub fn reactive(self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Run configuration.
///
/// Serializable so hosts can persist a tuned setup; environment knobs are
/// layered on top with [`PilotConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotConfig {
    pub chart_url: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub storage_state_path: Option<PathBuf>,
    #[serde(default = "default_preset_path")]
    pub preset_path: PathBuf,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub capabilities: ExecutorCapabilities,
    #[serde(default)]
    pub overlay_suppression: OverlaySuppression,
    #[serde(default)]
    pub fallback_domain: FallbackDomain,
    #[serde(default = "default_axis_label_cap")]
    pub axis_label_cap: usize,
    #[serde(default = "default_clear_iteration_cap")]
    pub clear_iteration_cap: usize,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self::new("https://www.tradingview.com/chart/")
    }
}

impl PilotConfig {
    #[must_use]
    pub fn new(chart_url: impl Into<String>) -> Self {
        Self {
            chart_url: chart_url.into(),
            viewport: Viewport::default(),
            headless: default_headless(),
            storage_state_path: None,
            preset_path: default_preset_path(),
            timings: Timings::default(),
            capabilities: ExecutorCapabilities::default(),
            overlay_suppression: OverlaySuppression::default(),
            fallback_domain: FallbackDomain::default(),
            axis_label_cap: default_axis_label_cap(),
            clear_iteration_cap: default_clear_iteration_cap(),
        }
    }

    /// Defaults overlaid with the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies environment-style overrides from `lookup`.
    ///
    /// Malformed values are logged and ignored so a typo never aborts a run.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_STORAGE_STATE).filter(|v| !v.trim().is_empty()) {
            self.storage_state_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_PRESET_PATH).filter(|v| !v.trim().is_empty()) {
            self.preset_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_SUPPRESS_BUDGET_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.timings.suppress_budget_ms = ms,
                Ok(_) => warn!(key = ENV_SUPPRESS_BUDGET_MS, value = %raw, "budget must be positive; keeping default"),
                Err(err) => warn!(key = ENV_SUPPRESS_BUDGET_MS, value = %raw, error = %err, "ignoring malformed budget"),
            }
        }
        if let Some(raw) = lookup(ENV_HEADLESS) {
            match parse_flag(&raw) {
                Some(flag) => self.headless = flag,
                None => warn!(key = ENV_HEADLESS, value = %raw, "ignoring malformed flag"),
            }
        }
        self
    }

    #[must_use]
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn with_storage_state(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_state_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_preset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preset_path = path.into();
        self
    }

    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: ExecutorCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_overlay_suppression(mut self, mode: OverlaySuppression) -> Self {
        self.overlay_suppression = mode;
        self
    }

    #[must_use]
    pub fn with_fallback_domain(mut self, min: f64, max: f64) -> Self {
        self.fallback_domain = FallbackDomain { min, max };
        self
    }

    pub fn validate(&self) -> PilotResult<()> {
        let t = &self.timings;
        let budgets = [
            ("per_strategy_timeout_ms", t.per_strategy_timeout_ms),
            ("action_attempt_timeout_ms", t.action_attempt_timeout_ms),
            ("suppress_budget_ms", t.suppress_budget_ms),
            ("health_probe_timeout_ms", t.health_probe_timeout_ms),
            ("poll_interval_ms", t.poll_interval_ms),
            ("plot_surface_timeout_ms", t.plot_surface_timeout_ms),
        ];
        if let Some((name, _)) = budgets.iter().find(|(_, ms)| *ms == 0) {
            return Err(PilotError::InvalidConfig(format!("{name} must be > 0")));
        }
        if t.drag_steps == 0 {
            return Err(PilotError::InvalidConfig("drag_steps must be > 0".to_owned()));
        }
        if !self.viewport.is_valid() {
            return Err(PilotError::InvalidConfig(
                "viewport width/height must be > 0".to_owned(),
            ));
        }
        let domain = self.fallback_domain;
        if !domain.min.is_finite() || !domain.max.is_finite() || domain.min >= domain.max {
            return Err(PilotError::InvalidConfig(
                "fallback domain must be finite with min < max".to_owned(),
            ));
        }
        if self.axis_label_cap < 2 {
            return Err(PilotError::InvalidConfig(
                "axis_label_cap must be >= 2".to_owned(),
            ));
        }
        if self.chart_url.trim().is_empty() {
            return Err(PilotError::InvalidConfig("chart_url is empty".to_owned()));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_headless() -> bool {
    true
}

fn default_preset_path() -> PathBuf {
    PathBuf::from("indicators.json")
}

fn default_axis_label_cap() -> usize {
    12
}

fn default_clear_iteration_cap() -> usize {
    10
}
