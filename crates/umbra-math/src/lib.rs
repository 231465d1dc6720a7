//! Umbra math utilities: colour science and count-based confidence.

pub mod math;

pub use math::color::{contrast_ratio, is_light, parse_color, relative_luminance, ColorParseError, Rgba};
pub use math::confidence::{clamp_probability, frequency, laplace};
pub use math::stable::{dot, sigmoid};
