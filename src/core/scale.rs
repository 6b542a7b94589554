use serde::{Deserialize, Serialize};

use crate::error::{PilotError, PilotResult};

/// Vertical pixel range a price domain is laid out on.
///
/// `top` maps to the domain maximum; `top + height` maps to the minimum,
/// matching chart price axes where higher prices sit higher on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSpan {
    pub top: f64,
    pub height: f64,
}

impl PixelSpan {
    #[must_use]
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.top.is_finite() && self.height.is_finite() && self.height > 0.0
    }
}

/// Linear domain scale with clamping, used when no axis samples exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearScale {
    domain_start: f64,
    domain_end: f64,
}

impl LinearScale {
    /// Domain assumed when nothing better is known.
    pub const DEFAULT_FALLBACK: Self = Self {
        domain_start: 140.0,
        domain_end: 160.0,
    };

    pub fn new(domain_start: f64, domain_end: f64) -> PilotResult<Self> {
        if !domain_start.is_finite() || !domain_end.is_finite() || domain_start == domain_end {
            return Err(PilotError::InvalidConfig(
                "scale domain must be finite and non-zero".to_owned(),
            ));
        }

        Ok(Self {
            domain_start: domain_start.min(domain_end),
            domain_end: domain_start.max(domain_end),
        })
    }

    #[must_use]
    pub fn domain(self) -> (f64, f64) {
        (self.domain_start, self.domain_end)
    }

    #[must_use]
    pub fn clamp(self, value: f64) -> f64 {
        value.clamp(self.domain_start, self.domain_end)
    }

    /// Maps `value` to a pixel inside `span`, clamping out-of-domain values
    /// to the span edges.
    #[must_use]
    pub fn domain_to_pixel(self, value: f64, span: PixelSpan) -> f64 {
        let value = if value.is_finite() {
            self.clamp(value)
        } else {
            self.domain_start
        };
        let ratio = (value - self.domain_start) / (self.domain_end - self.domain_start);
        span.top + span.height * (1.0 - ratio)
    }

    /// Inverse of [`Self::domain_to_pixel`] for pixels inside `span`.
    #[must_use]
    pub fn pixel_to_domain(self, pixel: f64, span: PixelSpan) -> f64 {
        let ratio = 1.0 - (pixel - span.top) / span.height;
        self.domain_start + ratio.clamp(0.0, 1.0) * (self.domain_end - self.domain_start)
    }
}
