//! Deterministic threshold rules.

use super::{DefectClassifier, ProblemTag};
use crate::collect::{StyleSnapshot, Visibility};
use std::collections::BTreeSet;
use umbra_config::ClassifierThresholds;
use umbra_math::{contrast_ratio, is_light, Rgba};

/// Whether any word of the node's role/classes/id starts with one of `hints`.
///
/// Words are split on non-alphanumerics, so `dropdown-menu` matches `menu`
/// and `navbar` matches `nav`, but `canvas` does not match `nav`.
pub(crate) fn matches_hint(snapshot: &StyleSnapshot, hints: &[String]) -> bool {
    snapshot.identity_tokens().any(|token| {
        token
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|word| hints.iter().any(|h| word.starts_with(h.as_str())))
    })
}

/// Effective text-on-background contrast, or `None` without a background.
pub(crate) fn effective_contrast(snapshot: &StyleSnapshot) -> Option<f64> {
    let bg = snapshot.background;
    if bg.is_transparent() {
        return None;
    }
    let backdrop = Rgba::opaque(bg.r, bg.g, bg.b);
    let fg = snapshot.foreground.over(backdrop);
    Some(contrast_ratio(fg, backdrop))
}

#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    thresholds: ClassifierThresholds,
}

impl HeuristicClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    fn box_in_range(&self, snapshot: &StyleSnapshot) -> bool {
        let t = &self.thresholds;
        let max_w = snapshot.viewport.width * t.max_viewport_fraction;
        let max_h = snapshot.viewport.height * t.max_viewport_fraction;
        (t.min_box_px..=max_w).contains(&snapshot.width)
            && (t.min_box_px..=max_h).contains(&snapshot.height)
    }

    fn is_transparent_menu(&self, snapshot: &StyleSnapshot) -> bool {
        let t = &self.thresholds;
        snapshot.position.is_out_of_flow()
            && snapshot.z_index.is_some_and(|z| z > t.menu_min_z_index)
            && snapshot.background.is_transparent()
            && self.box_in_range(snapshot)
            && matches_hint(snapshot, &t.menu_hints)
            && !matches_hint(snapshot, &t.exclusion_hints)
    }
}

impl DefectClassifier for HeuristicClassifier {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn classify(&self, snapshot: &StyleSnapshot) -> BTreeSet<ProblemTag> {
        let t = &self.thresholds;
        let mut tags = BTreeSet::new();

        if self.is_transparent_menu(snapshot) {
            tags.insert(ProblemTag::TransparentMenuBackground);
        }

        if effective_contrast(snapshot).is_some_and(|ratio| ratio < t.min_contrast_ratio) {
            tags.insert(ProblemTag::PoorContrast);
        }

        if snapshot.background.a > 0.0
            && snapshot.background.all_channels_above(t.white_channel_threshold)
        {
            tags.insert(ProblemTag::WhiteBackground);
        }

        if snapshot.visibility == Visibility::Hidden && snapshot.text_len > 0 {
            tags.insert(ProblemTag::HiddenContent);
        }

        if snapshot.opacity < t.low_opacity_threshold {
            tags.insert(ProblemTag::LowOpacity);
        }

        if snapshot.border_width > 0.0
            && snapshot.border_color.a > 0.0
            && is_light(snapshot.border_color, t.light_border_luminance)
        {
            tags.insert(ProblemTag::LightBorder);
        }

        tags
    }
}
