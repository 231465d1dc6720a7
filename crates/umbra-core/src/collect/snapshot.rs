//! Style snapshots: the materialized, typed view of one node's style.

use crate::host::{BoundingBox, ComputedStyle, ElementInfo, Viewport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use umbra_common::NodeId;
use umbra_math::{parse_color, ColorParseError, Rgba};

/// A node's style data could not be interpreted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassificationError {
    #[error("node {node}: malformed {field} value {value:?}")]
    Malformed {
        node: NodeId,
        field: &'static str,
        value: String,
    },

    #[error("node {node}: bad colour in {field}: {source}")]
    Color {
        node: NodeId,
        field: &'static str,
        #[source]
        source: ColorParseError,
    },

    #[error("node {node}: {reason}")]
    Unreadable { node: NodeId, reason: String },
}

impl From<ClassificationError> for umbra_common::Error {
    fn from(err: ClassificationError) -> Self {
        let node = match &err {
            ClassificationError::Malformed { node, .. }
            | ClassificationError::Color { node, .. }
            | ClassificationError::Unreadable { node, .. } => node.to_string(),
        };
        umbra_common::Error::Classification {
            node,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl PositionMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "static" | "" => Some(PositionMode::Static),
            "relative" => Some(PositionMode::Relative),
            "absolute" => Some(PositionMode::Absolute),
            "fixed" => Some(PositionMode::Fixed),
            "sticky" | "-webkit-sticky" => Some(PositionMode::Sticky),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionMode::Static => "static",
            PositionMode::Relative => "relative",
            PositionMode::Absolute => "absolute",
            PositionMode::Fixed => "fixed",
            PositionMode::Sticky => "sticky",
        }
    }

    /// Taken out of normal flow.
    pub fn is_out_of_flow(&self) -> bool {
        matches!(self, PositionMode::Absolute | PositionMode::Fixed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "visible" | "" => Some(Visibility::Visible),
            "hidden" | "collapse" => Some(Visibility::Hidden),
            _ => None,
        }
    }
}

/// Typed per-node style, valid for one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSnapshot {
    pub node: NodeId,
    pub background: Rgba,
    pub foreground: Rgba,
    pub border_color: Rgba,
    pub border_width: f64,
    pub opacity: f64,
    pub visibility: Visibility,
    pub position: PositionMode,
    /// `None` for `auto`.
    pub z_index: Option<i64>,
    pub width: f64,
    pub height: f64,
    pub viewport: Viewport,
    pub element_type: String,
    pub role: Option<String>,
    pub classes: BTreeSet<String>,
    pub id: Option<String>,
    pub text_len: usize,
    pub identity_path: String,
}

impl StyleSnapshot {
    pub fn from_parts(
        node: NodeId,
        style: &ComputedStyle,
        bbox: &BoundingBox,
        info: &ElementInfo,
        viewport: Viewport,
        identity_path: String,
    ) -> Result<Self, ClassificationError> {
        let color = |field: &'static str, raw: &str| {
            parse_color(raw).map_err(|source| ClassificationError::Color {
                node,
                field,
                source,
            })
        };
        let malformed = |field: &'static str, raw: &str| ClassificationError::Malformed {
            node,
            field,
            value: raw.to_string(),
        };

        let opacity = style
            .opacity
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed("opacity", &style.opacity))?
            .clamp(0.0, 1.0);

        let z_index = match style.z_index.trim() {
            "auto" | "" => None,
            raw => Some(raw.parse::<i64>().map_err(|_| malformed("z-index", raw))?),
        };

        Ok(Self {
            node,
            background: color("background-color", &style.background_color)?,
            foreground: color("color", &style.color)?,
            border_color: color("border-color", &style.border_color)?,
            border_width: parse_length(&style.border_width)
                .ok_or_else(|| malformed("border-width", &style.border_width))?,
            opacity,
            visibility: Visibility::parse(&style.visibility)
                .ok_or_else(|| malformed("visibility", &style.visibility))?,
            position: PositionMode::parse(&style.position)
                .ok_or_else(|| malformed("position", &style.position))?,
            z_index,
            width: bbox.width,
            height: bbox.height,
            viewport,
            element_type: info.tag.to_ascii_lowercase(),
            role: info.role.clone(),
            classes: info.classes.iter().cloned().collect(),
            id: info.id.clone().filter(|id| !id.is_empty()),
            text_len: info.text_len,
            identity_path,
        })
    }

    /// Role, classes, and id lowercased, for hint matching.
    pub fn identity_tokens(&self) -> impl Iterator<Item = String> + '_ {
        self.role
            .iter()
            .chain(self.classes.iter())
            .chain(self.id.iter())
            .map(|s| s.to_ascii_lowercase())
    }
}

/// Parse a CSS length in px (`12px`, `0`, `1.5px`). Negative lengths are invalid.
fn parse_length(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
