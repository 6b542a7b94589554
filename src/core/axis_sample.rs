use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// One `(value, pixel)` pair harvested from a price-axis label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSample {
    pub value: f64,
    pub pixel: f64,
}

impl AxisSample {
    #[must_use]
    pub fn new(value: f64, pixel: f64) -> Self {
        Self { value, pixel }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.value.is_finite() && self.pixel.is_finite()
    }

    /// Builds a sample from raw label text, returning `None` when the text
    /// carries no numeric token.
    #[must_use]
    pub fn from_label(text: &str, pixel: f64) -> Option<Self> {
        let value = parse_axis_label(text)?;
        let sample = Self::new(value, pixel);
        sample.is_finite().then_some(sample)
    }
}

// Group separators seen on price axes across locales.
const GROUP_SEPARATORS: [char; 5] = [',', '\'', '\u{2009}', '\u{202F}', '\u{00A0}'];

/// Parses the leading numeric token of an axis label.
///
/// Thousands separators, currency decoration and the typographic minus sign
/// are tolerated: `"$1,234.50"`, `"−0.25 %"` and `"152.340 JPY"` all parse.
#[must_use]
pub fn parse_axis_label(text: &str) -> Option<f64> {
    let normalized: String = text
        .chars()
        .filter(|c| !GROUP_SEPARATORS.contains(c))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    let chars: Vec<char> = normalized.chars().collect();
    let start = chars.iter().position(char::is_ascii_digit)?;
    // The sign may sit ahead of a currency symbol, as in "-$1,234".
    let negative = chars[..start].contains(&'-');

    let mut token = String::with_capacity(chars.len() - start + 1);
    if negative {
        token.push('-');
    }
    let mut seen_dot = false;
    for (offset, &c) in chars[start..].iter().enumerate() {
        if c.is_ascii_digit() {
            token.push(c);
        } else if c == '.' && !seen_dot {
            let next_is_digit = chars
                .get(start + offset + 1)
                .is_some_and(char::is_ascii_digit);
            if !next_is_digit {
                break;
            }
            seen_dot = true;
            token.push(c);
        } else {
            break;
        }
    }

    Decimal::from_str(&token).ok()?.to_f64()
}
