use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::{Point, Rect};

/// A piece of visible text found on the page and where it was rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelHit {
    pub text: String,
    pub bounds: Rect,
}

impl LabelHit {
    #[must_use]
    pub fn new(text: impl Into<String>, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            bounds,
        }
    }
}

/// Region around a drag path where result labels are expected to appear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityWindow {
    region: Rect,
}

impl ProximityWindow {
    #[must_use]
    pub fn around(start: Point, end: Point, margin: f64) -> Self {
        Self {
            region: Rect::spanning(start, end).inflate(margin.max(0.0)),
        }
    }

    #[must_use]
    pub fn region(self) -> Rect {
        self.region
    }

    #[must_use]
    pub fn contains(self, hit: &LabelHit) -> bool {
        self.region.contains(hit.bounds.center())
    }
}

/// Outcome of a proximity check.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub verified: bool,
    pub matched: SmallVec<[String; 8]>,
}

/// Proximity heuristic: a drawing counts as materialized when at least
/// `min_matches` distinct expected labels render inside the window around
/// its drag path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationHeuristic {
    pub expected_labels: Vec<String>,
    pub margin_px: f64,
    pub min_matches: usize,
}

impl VerificationHeuristic {
    #[must_use]
    pub fn new(expected_labels: Vec<String>) -> Self {
        Self {
            expected_labels,
            margin_px: 48.0,
            min_matches: 2,
        }
    }

    #[must_use]
    pub fn with_margin(mut self, margin_px: f64) -> Self {
        self.margin_px = margin_px;
        self
    }

    #[must_use]
    pub fn window(&self, start: Point, end: Point) -> ProximityWindow {
        ProximityWindow::around(start, end, self.margin_px)
    }

    #[must_use]
    pub fn evaluate(&self, start: Point, end: Point, hits: &[LabelHit]) -> Verification {
        let window = self.window(start, end);
        let mut matched: SmallVec<[String; 8]> = SmallVec::new();

        for expected in &self.expected_labels {
            let found = hits
                .iter()
                .filter(|hit| window.contains(hit))
                .any(|hit| label_matches(&hit.text, expected));
            if found && !matched.contains(expected) {
                matched.push(expected.clone());
            }
        }

        Verification {
            verified: matched.len() >= self.min_matches.max(1),
            matched,
        }
    }
}

// "0.618(151.20)" matches "0.618"; "0.6180", "10.618" and, for "0",
// "0.618" do not.
fn label_matches(text: &str, expected: &str) -> bool {
    let Some(rest) = text.trim().strip_prefix(expected) else {
        return false;
    };
    let mut rest = rest.chars();
    match rest.next() {
        Some(c) if c.is_ascii_digit() => false,
        Some('.') => !rest.next().is_some_and(|c| c.is_ascii_digit()),
        _ => true,
    }
}
