use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::{
    ChartContext, Direction, DrawingController, DrawingReport, DrawingTarget, FailureStage,
    InterstitialSuppressor, ParamsReport, PilotConfig, PresetApplier, PresetReport,
    RecoverableFailure, SuppressionMode, SuppressionReport, SymbolTier, TimeframeTier, UiProfile,
    load_preset,
};
use crate::core::{IndicatorPreset, ParamValue};
use crate::driver::Page;
use crate::error::{PilotError, PilotResult};
use crate::extensions::{AnnotationRequest, ScreenshotAnnotator};

/// Preset to apply as part of a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetSelection {
    pub name: String,
    #[serde(default)]
    pub clear_existing: bool,
    #[serde(default)]
    pub skip_params: bool,
}

/// Retracement to draw before the screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawingSpec {
    pub target: DrawingTarget,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default)]
    pub indicators: Vec<String>,
    pub outfile: PathBuf,
    #[serde(default)]
    pub annotate: Option<AnnotationRequest>,
    #[serde(default)]
    pub preset: Option<PresetSelection>,
    #[serde(default)]
    pub drawing: Option<DrawingSpec>,
}

impl CaptureRequest {
    #[must_use]
    pub fn new(symbol: impl Into<String>, outfile: impl Into<PathBuf>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: default_timeframe(),
            indicators: Vec::new(),
            outfile: outfile.into(),
            annotate: None,
            preset: None,
            drawing: None,
        }
    }

    #[must_use]
    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }

    #[must_use]
    pub fn with_indicator(mut self, name: impl Into<String>) -> Self {
        self.indicators.push(name.into());
        self
    }

    #[must_use]
    pub fn with_preset(mut self, name: impl Into<String>, clear_existing: bool, skip_params: bool) -> Self {
        self.preset = Some(PresetSelection {
            name: name.into(),
            clear_existing,
            skip_params,
        });
        self
    }

    #[must_use]
    pub fn with_drawing(mut self, target: DrawingTarget, direction: Direction) -> Self {
        self.drawing = Some(DrawingSpec { target, direction });
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: AnnotationRequest) -> Self {
        self.annotate = Some(annotation);
        self
    }
}

fn default_timeframe() -> String {
    "1h".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub file: PathBuf,
    pub symbol: String,
    pub timeframe: String,
    pub captured_at: DateTime<Utc>,
    pub symbol_tier: Option<SymbolTier>,
    pub timeframe_tier: Option<TimeframeTier>,
    pub indicators_added: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<PresetReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawing: Option<DrawingReport>,
    pub suppression: SuppressionReport,
    pub annotated: bool,
    /// Every recoverable condition of the run, nested reports included.
    pub failures: Vec<RecoverableFailure>,
}

/// Facade over one page for one run.
///
/// The chart is opened lazily by the first entry point; ambient suppression
/// is installed before that navigation. A fatal error stops the run before
/// any screenshot is taken.
pub struct ChartPilot<P: Page> {
    page: P,
    config: PilotConfig,
    profile: UiProfile,
    annotator: Option<Box<dyn ScreenshotAnnotator>>,
    opened: OnceCell<()>,
}

impl<P: Page> ChartPilot<P> {
    pub fn new(page: P, config: PilotConfig, profile: UiProfile) -> PilotResult<Self> {
        config.validate()?;
        profile.validate()?;
        Ok(Self {
            page,
            config,
            profile,
            annotator: None,
            opened: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn with_annotator(mut self, annotator: Box<dyn ScreenshotAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    #[must_use]
    pub fn page(&self) -> &P {
        &self.page
    }

    #[must_use]
    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    #[must_use]
    pub fn profile(&self) -> &UiProfile {
        &self.profile
    }

    #[must_use]
    pub fn into_page(self) -> P {
        self.page
    }

    fn suppressor(&self) -> InterstitialSuppressor<'_, P> {
        InterstitialSuppressor::new(
            &self.page,
            &self.profile.popup,
            &self.profile.plot_surface,
            &self.config.timings,
            self.config.overlay_suppression,
        )
    }

    /// Installs ambient suppression, navigates and focuses the plot.
    /// Runs once; later calls return immediately.
    pub async fn open(&self) -> PilotResult<()> {
        self.opened
            .get_or_try_init(|| self.open_chart())
            .await
            .map(|_| ())
    }

    async fn open_chart(&self) -> PilotResult<()> {
        let suppressor = self.suppressor();
        suppressor.install_ambient().await?;
        self.page.goto(&self.config.chart_url).await?;
        info!(url = %self.config.chart_url, "chart opened");

        let context = ChartContext::new(&self.page, &self.profile, &self.config)
            .with_suppressor(&suppressor);
        context.wait_for_plot_surface().await?;
        suppressor.suppress(SuppressionMode::Full).await;
        context.focus_plot().await?;
        Ok(())
    }

    /// Full capture: symbol, timeframe, preset, indicators, optional
    /// drawing, screenshot and annotation.
    pub async fn capture(&self, request: &CaptureRequest) -> PilotResult<CaptureReport> {
        let preset = match &request.preset {
            Some(selection) => Some(self.load(&selection.name).await?),
            None => None,
        };
        if let Some(annotation) = &request.annotate {
            annotation.validate()?;
        }
        self.open().await?;

        let suppressor = self.suppressor();
        let mut failures = Vec::new();

        let context = ChartContext::new(&self.page, &self.profile, &self.config)
            .with_suppressor(&suppressor);
        let symbol_tier = context.set_symbol(&request.symbol).await;
        if symbol_tier.is_none() {
            failures.push(RecoverableFailure::new(
                FailureStage::Symbol,
                request.symbol.as_str(),
                "every symbol search tier failed",
            ));
        }
        let timeframe_tier = context.set_timeframe(&request.timeframe).await;
        if timeframe_tier.is_none() {
            failures.push(RecoverableFailure::new(
                FailureStage::Timeframe,
                request.timeframe.as_str(),
                "timeframe could not be set",
            ));
        }

        let applier = PresetApplier::new(&self.page, &self.profile, &self.config)
            .with_suppressor(&suppressor);
        let preset_report = match (&preset, &request.preset) {
            (Some(preset), Some(selection)) => {
                let report = applier
                    .apply_loaded(preset, selection.clear_existing, selection.skip_params)
                    .await;
                failures.extend(report.failures.iter().cloned());
                Some(report)
            }
            _ => None,
        };

        let mut indicators_added = Vec::new();
        for indicator in &request.indicators {
            match applier.ensure_indicator(indicator).await {
                Ok(_) => indicators_added.push(indicator.clone()),
                Err(detail) => {
                    warn!(indicator = %indicator, %detail, "indicator add failed");
                    failures.push(RecoverableFailure::new(
                        FailureStage::IndicatorAdd,
                        indicator.as_str(),
                        detail,
                    ));
                }
            }
        }

        let drawing = match request.drawing {
            Some(planned) => {
                let report = DrawingController::new(&self.page, &self.profile, &self.config)
                    .with_suppressor(&suppressor)
                    .draw(planned.target, planned.direction)
                    .await?;
                failures.extend(report.failures.iter().cloned());
                Some(report)
            }
            None => None,
        };

        let mode = if drawing.is_some() {
            SuppressionMode::Gentle
        } else {
            SuppressionMode::Full
        };
        let suppression = self.save_screenshot(&request.outfile, mode).await?;
        if suppression.budget_expired {
            failures.push(RecoverableFailure::new(
                FailureStage::Suppression,
                "screenshot",
                format!("suppression budget expired after {} ms", suppression.elapsed_ms),
            ));
        }

        let annotated = match &request.annotate {
            Some(annotation) => self.annotate(&request.outfile, annotation, &mut failures),
            None => false,
        };

        info!(
            file = %request.outfile.display(),
            failures = failures.len(),
            "capture complete"
        );
        Ok(CaptureReport {
            file: request.outfile.clone(),
            symbol: request.symbol.clone(),
            timeframe: request.timeframe.clone(),
            captured_at: Utc::now(),
            symbol_tier,
            timeframe_tier,
            indicators_added,
            preset: preset_report,
            drawing,
            suppression,
            annotated,
            failures,
        })
    }

    /// Applies preset `name` to the open chart. The preset is loaded before
    /// the page is touched.
    pub async fn apply_preset(
        &self,
        name: &str,
        clear_existing: bool,
        skip_params: bool,
    ) -> PilotResult<PresetReport> {
        let preset = self.load(name).await?;
        self.open().await?;
        let suppressor = self.suppressor();
        let report = PresetApplier::new(&self.page, &self.profile, &self.config)
            .with_suppressor(&suppressor)
            .apply_loaded(&preset, clear_existing, skip_params)
            .await;
        Ok(report)
    }

    /// Applies `params` to an indicator already on the chart.
    pub async fn tune_indicator(
        &self,
        name: &str,
        params: &IndexMap<String, ParamValue>,
    ) -> PilotResult<ParamsReport> {
        self.open().await?;
        let suppressor = self.suppressor();
        let report = PresetApplier::new(&self.page, &self.profile, &self.config)
            .with_suppressor(&suppressor)
            .apply_params(name, params)
            .await;
        Ok(report)
    }

    pub async fn draw_fibo_by_prices(
        &self,
        high: f64,
        low: f64,
        x_ratio_start: f64,
        x_ratio_end: f64,
        direction: Direction,
    ) -> PilotResult<DrawingReport> {
        let target = DrawingTarget::Prices {
            high,
            low,
            x_start: x_ratio_start,
            x_end: x_ratio_end,
        };
        self.draw(target, direction).await
    }

    pub async fn draw_fibo_quick(&self, direction: Direction) -> PilotResult<DrawingReport> {
        self.draw(DrawingTarget::Quick, direction).await
    }

    async fn draw(&self, target: DrawingTarget, direction: Direction) -> PilotResult<DrawingReport> {
        self.open().await?;
        let suppressor = self.suppressor();
        DrawingController::new(&self.page, &self.profile, &self.config)
            .with_suppressor(&suppressor)
            .draw(target, direction)
            .await
    }

    /// Clears interstitials and writes a PNG to `path`.
    ///
    /// Use [`SuppressionMode::Gentle`] when a fresh drawing is on the chart.
    pub async fn save_screenshot(
        &self,
        path: &Path,
        mode: SuppressionMode,
    ) -> PilotResult<SuppressionReport> {
        let suppressor = self.suppressor();
        if let Err(err) = suppressor.hide_dialogs().await {
            warn!(error = %err, "dialog stylesheet not injected");
        }
        let report = suppressor.suppress(mode).await;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PilotError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        sleep(self.config.timings.settle()).await;
        self.page.screenshot(path).await?;
        debug!(path = %path.display(), ?mode, "screenshot saved");
        Ok(report)
    }

    fn annotate(
        &self,
        path: &Path,
        annotation: &AnnotationRequest,
        failures: &mut Vec<RecoverableFailure>,
    ) -> bool {
        let Some(annotator) = &self.annotator else {
            failures.push(RecoverableFailure::new(
                FailureStage::Annotation,
                path.display().to_string(),
                "no annotator installed",
            ));
            return false;
        };
        match annotator.annotate(path, annotation) {
            Ok(()) => true,
            Err(err) => {
                warn!(annotator = annotator.id(), error = %err, "annotation failed");
                failures.push(RecoverableFailure::new(
                    FailureStage::Annotation,
                    path.display().to_string(),
                    err.to_string(),
                ));
                false
            }
        }
    }

    async fn load(&self, name: &str) -> PilotResult<IndicatorPreset> {
        load_preset(&self.config.preset_path, name).await
    }
}

#[cfg(feature = "cdp-backend")]
impl ChartPilot<crate::driver::CdpPage> {
    /// Launches a browser configured from `config`.
    pub async fn launch(config: PilotConfig, profile: UiProfile) -> PilotResult<Self> {
        config.validate()?;
        let options = crate::driver::CdpLaunchOptions {
            headless: config.headless,
            viewport: config.viewport,
            storage_state: config.storage_state_path.clone(),
            executable: None,
        };
        let page = crate::driver::CdpPage::launch(options).await?;
        Self::new(page, config, profile)
    }
}
