use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::{AxisSample, LinearScale, PixelSpan, Viewport};

/// How a [`CoordinateTransform`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformKind {
    /// Least-squares fit over three or more samples.
    LeastSquares,
    /// Exact line through exactly two samples.
    TwoPoint,
    /// Clamped linear mapping over an assumed domain; used when the axis
    /// yielded fewer than two distinct values.
    ClampedFallback,
}

/// Assumed price domain for the fallback mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackDomain {
    pub min: f64,
    pub max: f64,
}

impl Default for FallbackDomain {
    fn default() -> Self {
        Self {
            min: 140.0,
            max: 160.0,
        }
    }
}

impl FallbackDomain {
    fn scale(self) -> LinearScale {
        LinearScale::new(self.min, self.max)
            .unwrap_or(LinearScale::DEFAULT_FALLBACK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Mapping {
    Linear { slope: f64, intercept: f64 },
    Clamped { scale: LinearScale, span: PixelSpan },
}

/// Value to pixel transform for one viewport snapshot: `pixel = a * value + b`.
///
/// Construction never fails. A transform is only meaningful for the viewport
/// it was sampled from and must be rebuilt after any scroll or zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    mapping: Mapping,
    kind: TransformKind,
    sample_count: usize,
    viewport: Option<Viewport>,
}

impl CoordinateTransform {
    /// Fits a transform to `samples`, falling back to a clamped mapping of
    /// `fallback` over `span` when the samples cannot define a line.
    #[must_use]
    pub fn fit(samples: &[AxisSample], fallback: FallbackDomain, span: PixelSpan) -> Self {
        let finite: Vec<AxisSample> = samples.iter().copied().filter(|s| s.is_finite()).collect();
        let distinct: BTreeSet<OrderedFloat<f64>> =
            finite.iter().map(|s| OrderedFloat(s.value)).collect();

        if distinct.len() >= 2 {
            let kind = if finite.len() == 2 {
                TransformKind::TwoPoint
            } else {
                TransformKind::LeastSquares
            };
            if let Some((slope, intercept)) = least_squares(&finite) {
                return Self {
                    mapping: Mapping::Linear { slope, intercept },
                    kind,
                    sample_count: finite.len(),
                    viewport: None,
                };
            }
        }

        Self::fallback(fallback, span, finite.len())
    }

    /// The clamped linear mapping used when no usable samples exist.
    #[must_use]
    pub fn fallback(domain: FallbackDomain, span: PixelSpan, sample_count: usize) -> Self {
        let span = if span.is_valid() {
            span
        } else {
            PixelSpan::new(0.0, 1.0)
        };
        Self {
            mapping: Mapping::Clamped {
                scale: domain.scale(),
                span,
            },
            kind: TransformKind::ClampedFallback,
            sample_count,
            viewport: None,
        }
    }

    /// Tags the transform with the viewport snapshot it was built for.
    #[must_use]
    pub fn for_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    #[must_use]
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    #[must_use]
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// `(a, b)` of the fitted line; `None` for the clamped fallback.
    #[must_use]
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        match self.mapping {
            Mapping::Linear { slope, intercept } => Some((slope, intercept)),
            Mapping::Clamped { .. } => None,
        }
    }

    #[must_use]
    pub fn value_to_pixel(&self, value: f64) -> f64 {
        match self.mapping {
            Mapping::Linear { slope, intercept } => slope * value + intercept,
            Mapping::Clamped { scale, span } => scale.domain_to_pixel(value, span),
        }
    }

    #[must_use]
    pub fn pixel_to_value(&self, pixel: f64) -> f64 {
        match self.mapping {
            Mapping::Linear { slope, intercept } => (pixel - intercept) / slope,
            Mapping::Clamped { scale, span } => scale.pixel_to_domain(pixel, span),
        }
    }
}

// Centered least squares; for two samples this is the exact line through them.
fn least_squares(samples: &[AxisSample]) -> Option<(f64, f64)> {
    let n = samples.len() as f64;
    let mean_value = samples.iter().map(|s| s.value).sum::<f64>() / n;
    let mean_pixel = samples.iter().map(|s| s.pixel).sum::<f64>() / n;

    let (covariance, variance) = samples.iter().fold((0.0, 0.0), |(cov, var), s| {
        let dv = s.value - mean_value;
        (cov + dv * (s.pixel - mean_pixel), var + dv * dv)
    });

    if variance == 0.0 || !variance.is_finite() {
        return None;
    }
    let slope = covariance / variance;
    if slope == 0.0 || !slope.is_finite() {
        return None;
    }
    let intercept = mean_pixel - slope * mean_value;
    intercept.is_finite().then_some((slope, intercept))
}
