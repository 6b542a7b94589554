pub mod axis_sample;
pub mod coordinate_transform;
pub mod preset;
pub mod proximity;
pub mod scale;
pub mod selector;
pub mod types;

pub use axis_sample::{AxisSample, parse_axis_label};
pub use coordinate_transform::{CoordinateTransform, FallbackDomain, TransformKind};
pub use preset::{IndicatorEntry, IndicatorPreset, ParamValue, PresetCatalog};
pub use proximity::{LabelHit, ProximityWindow, Verification, VerificationHeuristic};
pub use scale::{LinearScale, PixelSpan};
pub use selector::{SelectorStrategy, StrategyTemplate};
pub use types::{Point, Rect, Viewport};
