use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PilotError, PilotResult};

/// Declared value for one indicator setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Numbers and numeric-looking strings go to numeric fields first;
    /// everything else is tried as a combo/select option first.
    #[must_use]
    pub fn prefers_numeric(&self) -> bool {
        match self {
            Self::Integer(_) | Self::Float(_) => true,
            Self::Bool(_) => false,
            Self::Text(text) => {
                let text = text.trim();
                !text.is_empty() && text.parse::<f64>().is_ok_and(f64::is_finite)
            }
        }
    }

    /// Compares against a value read back from the settings surface.
    #[must_use]
    pub fn matches_readback(&self, readback: &str) -> bool {
        let readback = readback.trim();
        let expected = self.to_string();
        if let (Ok(a), Ok(b)) = (expected.parse::<f64>(), readback.parse::<f64>()) {
            return (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0);
        }
        expected.eq_ignore_ascii_case(readback)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// One entry of a preset: either a bare name or a name with settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        params: IndexMap<String, ParamValue>,
    },
}

impl IndicatorEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    /// Declared settings in declaration order; empty for bare names.
    #[must_use]
    pub fn params(&self) -> Option<&IndexMap<String, ParamValue>> {
        match self {
            Self::Name(_) => None,
            Self::Detailed { params, .. } => (!params.is_empty()).then_some(params),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PresetBody {
    #[serde(default)]
    indicators: Vec<IndicatorEntry>,
}

/// Named, ordered list of indicators to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPreset {
    pub name: String,
    pub indicators: Vec<IndicatorEntry>,
}

impl IndicatorPreset {
    /// Indicator names in application order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.indicators
            .iter()
            .map(|entry| entry.name().to_owned())
            .collect()
    }
}

/// All presets from one preset file, in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresetCatalog {
    presets: IndexMap<String, PresetBody>,
}

impl PresetCatalog {
    /// Parses preset JSON; `origin` is only used for error messages.
    pub fn from_json_str(origin: &Path, input: &str) -> PilotResult<Self> {
        let presets: IndexMap<String, PresetBody> =
            serde_json::from_str(input).map_err(|e| PilotError::InvalidPreset {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self { presets })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, name: &str) -> PilotResult<IndicatorPreset> {
        let body = self
            .presets
            .get(name)
            .ok_or_else(|| PilotError::PresetNotFound {
                name: name.to_owned(),
            })?;
        Ok(IndicatorPreset {
            name: name.to_owned(),
            indicators: body.indicators.clone(),
        })
    }
}
