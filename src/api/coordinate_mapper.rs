use tracing::{debug, trace};

use crate::api::{LocatorResolver, PilotConfig, Timings, UiProfile};
use crate::core::{AxisSample, CoordinateTransform, FallbackDomain, PixelSpan, Rect, Viewport};
use crate::driver::{Page, WaitState};
use crate::error::{PilotError, PilotResult};

/// Builds price-to-pixel transforms from the labels currently rendered on
/// the price axis.
pub struct CoordinateMapper<'p, P: Page> {
    page: &'p P,
    profile: &'p UiProfile,
    resolver: LocatorResolver<'p, P>,
    timings: Timings,
    fallback: FallbackDomain,
    label_cap: usize,
    configured_viewport: Viewport,
}

impl<'p, P: Page> CoordinateMapper<'p, P> {
    #[must_use]
    pub fn new(page: &'p P, profile: &'p UiProfile, config: &PilotConfig) -> Self {
        Self {
            page,
            profile,
            resolver: LocatorResolver::new(page, &config.timings),
            timings: config.timings,
            fallback: config.fallback_domain,
            label_cap: config.axis_label_cap,
            configured_viewport: config.viewport,
        }
    }

    /// Bounds of the plot surface, if it can be found.
    pub async fn plot_rect(&self) -> Option<Rect> {
        self.resolver
            .resolve(
                &self.profile.plot_surface,
                self.timings.per_strategy_timeout(),
                WaitState::Visible,
            )
            .await
            .into_handle()
            .and_then(|handle| handle.bounds)
            .filter(|rect| !rect.is_empty())
    }

    pub async fn require_plot_rect(&self) -> PilotResult<Rect> {
        self.plot_rect()
            .await
            .ok_or(PilotError::PlotSurfaceUnavailable {
                timeout: self.timings.per_strategy_timeout(),
            })
    }

    /// Samples the axis and fits a transform for the current viewport.
    ///
    /// Never fails: with fewer than two usable labels the clamped fallback
    /// over the configured domain is returned.
    pub async fn build(&self) -> CoordinateTransform {
        let plot = self.plot_rect().await;
        self.build_with_plot(plot).await
    }

    /// Same as [`Self::build`] with an already known plot rectangle.
    pub async fn build_with_plot(&self, plot: Option<Rect>) -> CoordinateTransform {
        let viewport = match self.page.viewport().await {
            Ok(viewport) if viewport.is_valid() => viewport,
            Ok(_) => self.configured_viewport,
            Err(err) => {
                trace!(error = %err, "viewport unavailable; using configured size");
                self.configured_viewport
            }
        };
        let span = match plot {
            Some(rect) => PixelSpan::new(rect.y, rect.height),
            None => PixelSpan::new(0.0, f64::from(viewport.height)),
        };

        let samples = self.collect_samples().await;
        let transform = CoordinateTransform::fit(&samples, self.fallback, span).for_viewport(viewport);
        debug!(
            samples = samples.len(),
            kind = ?transform.kind(),
            "coordinate transform built"
        );
        transform
    }

    /// Up to the configured cap of `(value, vertical centre)` samples.
    pub async fn collect_samples(&self) -> Vec<AxisSample> {
        let labels = self
            .resolver
            .resolve_all(
                &self.profile.price_axis_labels,
                self.timings.per_strategy_timeout(),
            )
            .await;

        labels
            .iter()
            .take(self.label_cap)
            .filter_map(|label| {
                let center = label.center()?;
                AxisSample::from_label(&label.text, center.y)
            })
            .collect()
    }
}
