//! Fixed fallback templates keyed by element type.
//!
//! A template is a base declaration body for a family of elements plus a
//! few tag-specific additions. Elements that render media (`img`, `video`,
//! `canvas`, `svg`, ...) have no template: repainting them does more harm
//! than good.

use crate::inference::ProblemTag;
use std::collections::BTreeSet;

/// Dark surface for floating menus and dialogs.
pub const SURFACE_RAISED: &str = "rgb(36, 36, 40)";
/// Dark surface for in-flow containers.
pub const SURFACE: &str = "rgb(24, 24, 27)";
pub const TEXT: &str = "rgb(228, 228, 231)";
pub const BORDER: &str = "rgb(63, 63, 70)";

struct Template {
    elements: &'static [&'static str],
    body: &'static str,
}

const TABLE: &[Template] = &[
    Template {
        elements: &["ul", "ol", "li", "menu", "nav", "dialog", "details", "summary"],
        body: "background-color: rgb(36, 36, 40); color: rgb(228, 228, 231);",
    },
    Template {
        elements: &[
            "div", "section", "article", "aside", "header", "footer", "main", "form", "fieldset",
            "figure", "blockquote",
        ],
        body: "background-color: rgb(24, 24, 27); color: rgb(228, 228, 231);",
    },
    Template {
        elements: &["table", "thead", "tbody", "tfoot", "tr", "td", "th", "caption"],
        body: "background-color: rgb(24, 24, 27); color: rgb(228, 228, 231); border-color: rgb(63, 63, 70);",
    },
    Template {
        elements: &["input", "textarea", "select", "option", "button"],
        body: "background-color: rgb(39, 39, 42); color: rgb(244, 244, 245); border-color: rgb(82, 82, 91);",
    },
    Template {
        elements: &["pre", "code", "kbd", "samp"],
        body: "background-color: rgb(30, 30, 33); color: rgb(212, 212, 216);",
    },
    Template {
        elements: &[
            "p", "span", "a", "label", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "em", "small",
            "b", "i", "dt", "dd",
        ],
        body: "color: rgb(228, 228, 231);",
    },
];

fn base_body(element_type: &str) -> Option<&'static str> {
    let element = element_type.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|t| t.elements.contains(&element.as_str()))
        .map(|t| t.body)
}

/// Template declaration body for an element and its tags, already
/// normalized to `!important` declarations.
pub fn template_rule(element_type: &str, tags: &BTreeSet<ProblemTag>) -> Option<String> {
    let mut decls: Vec<String> = base_body(element_type)?
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();

    let has = |property: &str| decls.iter().any(|d| d.starts_with(property));
    let mut extra = Vec::new();
    if tags.contains(&ProblemTag::TransparentMenuBackground) && !has("background-color") {
        extra.push(format!("background-color: {}", SURFACE_RAISED));
    }
    if tags.contains(&ProblemTag::WhiteBackground) && !has("background-color") {
        extra.push(format!("background-color: {}", SURFACE));
    }
    if tags.contains(&ProblemTag::PoorContrast) && !has("color") {
        extra.push(format!("color: {}", TEXT));
    }
    if tags.contains(&ProblemTag::LightBorder) && !has("border-color") {
        extra.push(format!("border-color: {}", BORDER));
    }
    if tags.contains(&ProblemTag::LowOpacity) {
        extra.push("opacity: 1".to_string());
    }
    if tags.contains(&ProblemTag::HiddenContent) {
        extra.push("visibility: visible".to_string());
    }
    decls.extend(extra);

    Some(
        decls
            .iter()
            .map(|d| format!("{} !important;", d))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[ProblemTag]) -> BTreeSet<ProblemTag> {
        list.iter().copied().collect()
    }

    #[test]
    fn menu_template_paints_raised_surface() {
        let rule = template_rule("UL", &tags(&[ProblemTag::TransparentMenuBackground])).unwrap();
        assert_eq!(
            rule,
            "background-color: rgb(36, 36, 40) !important; color: rgb(228, 228, 231) !important;"
        );
    }

    #[test]
    fn text_template_gains_tag_specific_declarations() {
        let rule = template_rule(
            "span",
            &tags(&[ProblemTag::WhiteBackground, ProblemTag::LightBorder, ProblemTag::LowOpacity]),
        )
        .unwrap();
        assert!(rule.contains("background-color: rgb(24, 24, 27) !important;"));
        assert!(rule.contains("border-color: rgb(63, 63, 70) !important;"));
        assert!(rule.contains("opacity: 1 !important;"));
    }

    #[test]
    fn media_elements_have_no_template() {
        assert_eq!(template_rule("img", &tags(&[ProblemTag::WhiteBackground])), None);
        assert_eq!(template_rule("canvas", &tags(&[])), None);
    }
}
