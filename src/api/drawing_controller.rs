use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::api::{
    ActionExecutor, ActionRequest, CoordinateMapper, FailureStage, InterstitialSuppressor,
    PilotConfig, RecoverableFailure, SuppressionMode, UiProfile,
};
use crate::core::{Point, Rect, TransformKind, Verification, VerificationHeuristic};
use crate::driver::{Page, PointerPhase};
use crate::error::{DriverError, DriverResult, PilotError, PilotResult};
use crate::interaction::DrawingState;

// Horizontal shift of the retry gesture; vertical anchors stay on the prices.
const RETRY_JITTER_PX: f64 = 6.0;

const QUICK_X: (f64, f64) = (0.25, 0.75);
const QUICK_Y: (f64, f64) = (0.18, 0.82);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    HighToLow,
    LowToHigh,
}

impl FromStr for Direction {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high_to_low" | "high-to-low" => Ok(Self::HighToLow),
            "low_to_high" | "low-to-high" => Ok(Self::LowToHigh),
            other => Err(PilotError::InvalidConfig(format!(
                "unknown drawing direction `{other}`"
            ))),
        }
    }
}

/// Where the two anchors of a retracement go.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DrawingTarget {
    /// Anchors at two prices, placed horizontally at fractions of the plot
    /// width.
    Prices {
        high: f64,
        low: f64,
        x_start: f64,
        x_end: f64,
    },
    /// Fixed fractions of the plot; needs no axis data.
    Quick,
}

impl DrawingTarget {
    #[must_use]
    pub fn prices(high: f64, low: f64) -> Self {
        Self::Prices {
            high,
            low,
            x_start: QUICK_X.0,
            x_end: QUICK_X.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureMode {
    Synthetic,
    Physical,
}

/// Which tool selection tier succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTier {
    Toolbar,
    GroupMenu,
    Hotkey,
}

/// One gesture to perform; built per drawing and dropped with it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingRequest {
    pub start: Point,
    pub end: Point,
    pub tool: String,
    pub verification: VerificationHeuristic,
}

impl DrawingRequest {
    /// Same gesture shifted sideways for the retry.
    #[must_use]
    pub fn jittered(&self) -> Self {
        Self {
            start: self.start.offset(RETRY_JITTER_PX, 0.0),
            end: self.end.offset(RETRY_JITTER_PX, 0.0),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingReport {
    pub from: Point,
    pub to: Point,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    pub verified: bool,
    pub matched: Vec<String>,
    pub tool_tier: ToolTier,
    /// Mode of the last drag that completed; `None` when every drag failed.
    pub gesture: Option<GestureMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_kind: Option<TransformKind>,
    pub retried: bool,
    pub failures: Vec<RecoverableFailure>,
}

/// Selects the retracement tool, drags it into place and checks that it
/// rendered. A cancel key is never sent after the drag: it would discard the
/// fresh drawing.
pub struct DrawingController<'p, P: Page> {
    page: &'p P,
    profile: &'p UiProfile,
    config: &'p PilotConfig,
    executor: ActionExecutor<'p, P>,
    mapper: CoordinateMapper<'p, P>,
    suppressor: Option<&'p InterstitialSuppressor<'p, P>>,
}

impl<'p, P: Page> DrawingController<'p, P> {
    #[must_use]
    pub fn new(page: &'p P, profile: &'p UiProfile, config: &'p PilotConfig) -> Self {
        Self {
            page,
            profile,
            config,
            executor: ActionExecutor::new(page, &config.timings, config.capabilities),
            mapper: CoordinateMapper::new(page, profile, config),
            suppressor: None,
        }
    }

    #[must_use]
    pub fn with_suppressor(mut self, suppressor: &'p InterstitialSuppressor<'p, P>) -> Self {
        self.executor = self.executor.with_suppressor(suppressor);
        self.suppressor = Some(suppressor);
        self
    }

    /// Draws a retracement between the anchors of `target`.
    ///
    /// Fails only when the plot surface is missing or no selection tier
    /// could pick the tool; an unverified drawing is reported in
    /// [`DrawingReport::failures`].
    pub async fn draw(&self, target: DrawingTarget, direction: Direction) -> PilotResult<DrawingReport> {
        let mut state = DrawingState::default();
        let plot = self.mapper.require_plot_rect().await?;
        let (start, end, transform_kind) = self.anchors(target, direction, plot).await?;

        if let Some(suppressor) = self.suppressor {
            suppressor.suppress(SuppressionMode::Full).await;
        }

        state.begin_tool_selection()?;
        let tool_tier = self.select_tool().await?;
        state.tool_selected()?;

        let mut request = DrawingRequest {
            start,
            end,
            tool: self.profile.fib_tool.name.clone(),
            verification: VerificationHeuristic::new(self.profile.fib_result_labels.clone()),
        };
        let mut failures = Vec::new();

        let mut gesture = None;
        let verification = loop {
            state.begin_drag()?;
            match self.drag(request.start, request.end).await {
                Ok(mode) => gesture = Some(mode),
                Err(err) => {
                    warn!(error = %err, "drag gesture failed");
                    failures.push(RecoverableFailure::new(
                        FailureStage::Drawing,
                        request.tool.as_str(),
                        format!("drag failed: {err}"),
                    ));
                }
            }
            sleep(self.config.timings.drawing_stabilization()).await;

            state.begin_verification()?;
            let verification = self.verify(&request).await;
            if verification.verified || !state.can_retry() {
                state.finish()?;
                break verification;
            }
            debug!(matched = verification.matched.len(), "drawing unverified; retrying once");
            state.retry()?;
            request = request.jittered();
        };

        if verification.verified {
            info!(tool = %request.tool, ?tool_tier, ?gesture, "drawing verified");
        } else {
            warn!(tool = %request.tool, matched = ?verification.matched, "drawing unverified");
            failures.push(RecoverableFailure::new(
                FailureStage::Drawing,
                request.tool.as_str(),
                format!(
                    "{} of {} result labels near the drag path",
                    verification.matched.len(),
                    request.verification.min_matches
                ),
            ));
        }

        let (high, low) = match target {
            DrawingTarget::Prices { high, low, .. } => (Some(high), Some(low)),
            DrawingTarget::Quick => (None, None),
        };
        Ok(DrawingReport {
            from: request.start,
            to: request.end,
            high,
            low,
            verified: verification.verified,
            matched: verification.matched.into_vec(),
            tool_tier,
            gesture,
            transform_kind,
            retried: state.retries_used() > 0,
            failures,
        })
    }

    async fn anchors(
        &self,
        target: DrawingTarget,
        direction: Direction,
        plot: Rect,
    ) -> PilotResult<(Point, Point, Option<TransformKind>)> {
        let (top, bottom, kind) = match target {
            DrawingTarget::Prices {
                high,
                low,
                x_start,
                x_end,
            } => {
                if !high.is_finite() || !low.is_finite() {
                    return Err(PilotError::InvalidConfig(
                        "drawing prices must be finite".to_owned(),
                    ));
                }
                let transform = self.mapper.build_with_plot(Some(plot)).await;
                let x1 = plot.x + plot.width * x_start.clamp(0.0, 1.0);
                let x2 = plot.x + plot.width * x_end.clamp(0.0, 1.0);
                (
                    Point::new(x1, transform.value_to_pixel(high)),
                    Point::new(x2, transform.value_to_pixel(low)),
                    Some(transform.kind()),
                )
            }
            DrawingTarget::Quick => (
                plot.at_fraction(QUICK_X.0, QUICK_Y.0),
                plot.at_fraction(QUICK_X.1, QUICK_Y.1),
                None,
            ),
        };

        // `top` carries the high anchor at the start x, `bottom` the low
        // anchor at the end x.
        let (start, end) = match direction {
            Direction::HighToLow => (top, bottom),
            Direction::LowToHigh => (Point::new(top.x, bottom.y), Point::new(bottom.x, top.y)),
        };
        trace!(?start, ?end, ?direction, "drawing anchors");
        Ok((start, end, kind))
    }

    /// Toolbar button, then tool-group menu, then hotkey.
    pub async fn select_tool(&self) -> PilotResult<ToolTier> {
        let settle = self.config.timings.settle();

        let reveal = ActionRequest::click(self.profile.drawing_toolbar_reveal.clone()).with_retries(0);
        let revealed = self.executor.perform(&reveal).await;
        trace!(revealed = revealed.succeeded, "drawing toolbar reveal");
        sleep(settle).await;

        let toolbar = ActionRequest::click(self.profile.fib_tool.clone()).with_retries(1);
        if self.executor.perform(&toolbar).await.succeeded {
            return Ok(ToolTier::Toolbar);
        }

        let group = ActionRequest::click(self.profile.fib_tool_group.clone()).with_retries(1);
        if self.executor.perform(&group).await.succeeded {
            sleep(settle).await;
            let entry =
                ActionRequest::click(self.profile.fib_tool_menu_entry.clone()).with_retries(1);
            if self.executor.perform(&entry).await.succeeded {
                return Ok(ToolTier::GroupMenu);
            }
        }

        match self.page.press_key(&self.profile.fib_tool_hotkey).await {
            Ok(()) => {
                debug!(hotkey = %self.profile.fib_tool_hotkey, "tool selected by hotkey");
                sleep(settle).await;
                Ok(ToolTier::Hotkey)
            }
            Err(err) => {
                warn!(error = %err, "tool hotkey failed");
                Err(PilotError::ToolSelectionFailed {
                    tool: self.profile.fib_tool.name.clone(),
                })
            }
        }
    }

    /// Synthetic pointer dispatch when available, otherwise a physical
    /// press-move-release with the configured delay and step count.
    pub async fn drag(&self, start: Point, end: Point) -> DriverResult<GestureMode> {
        if self.config.capabilities.use_synthetic_events {
            match self.synthetic_drag(start, end).await {
                Ok(()) => return Ok(GestureMode::Synthetic),
                Err(DriverError::Unsupported { .. }) => {
                    trace!("synthetic pointer unsupported; using physical drag");
                }
                Err(err) => debug!(error = %err, "synthetic drag failed; using physical drag"),
            }
        }
        self.physical_drag(start, end).await?;
        Ok(GestureMode::Physical)
    }

    async fn synthetic_drag(&self, start: Point, end: Point) -> DriverResult<()> {
        let steps = self.config.timings.drag_steps.max(1);
        self.page.dispatch_pointer(PointerPhase::Down, start).await?;
        sleep(self.config.timings.press_move_delay()).await;
        for step in 1..=steps {
            let t = f64::from(step) / f64::from(steps);
            self.page
                .dispatch_pointer(PointerPhase::Move, start.lerp(end, t))
                .await?;
        }
        self.page.dispatch_pointer(PointerPhase::Up, end).await
    }

    async fn physical_drag(&self, start: Point, end: Point) -> DriverResult<()> {
        self.page.mouse_move(start, 1).await?;
        self.page.mouse_down().await?;
        sleep(self.config.timings.press_move_delay()).await;
        self.page
            .mouse_move(end, self.config.timings.drag_steps.max(1))
            .await?;
        self.page.mouse_up().await
    }

    async fn verify(&self, request: &DrawingRequest) -> Verification {
        let hits = match self.page.find_text(&request.verification.expected_labels).await {
            Ok(hits) => hits,
            Err(err) => {
                trace!(error = %err, "result label search failed");
                Vec::new()
            }
        };
        request
            .verification
            .evaluate(request.start, request.end, &hits)
    }
}
