//! Property-based tests for scanning and heuristic classification.

use proptest::prelude::*;
use umbra_core::collect::{ScanOptions, TreeScanner};
use umbra_core::host::{BoundingBox, ComputedStyle, ElementDoc, HostTree, MemoryTree, TreeDocument, Viewport};
use umbra_core::inference::{build_classifier, detect_issues, ClassifierStrategy, Issue, ProblemTag};
use umbra_config::ClassifierThresholds;

fn element(tag: &str, classes: &[String], style: ComputedStyle, width: f64, height: f64) -> ElementDoc {
    ElementDoc {
        tag: tag.to_string(),
        id: None,
        classes: classes.to_vec(),
        role: None,
        text: "Item".to_string(),
        style,
        bbox: BoundingBox {
            x: 0.0,
            y: 0.0,
            width,
            height,
        },
        children: Vec::new(),
    }
}

/// `html > body(dark) > node`
fn page_with(node: ElementDoc) -> MemoryTree {
    let body_style = ComputedStyle {
        background_color: "rgb(18, 18, 18)".to_string(),
        color: "rgb(220, 220, 220)".to_string(),
        ..ComputedStyle::default()
    };
    let mut body = element("body", &[], body_style, 1920.0, 1080.0);
    body.text.clear();
    body.children.push(node);
    let mut html = element("html", &[], ComputedStyle::default(), 1920.0, 1080.0);
    html.text.clear();
    html.children.push(body);
    MemoryTree::from_document(TreeDocument {
        viewport: Viewport {
            width: 1920.0,
            height: 1080.0,
        },
        root: html,
    })
}

fn detect(tree: &MemoryTree) -> Vec<Issue> {
    let classifier = build_classifier(ClassifierStrategy::Heuristic, ClassifierThresholds::default());
    let out = TreeScanner::new().scan(tree, tree.root(), ScanOptions::default());
    detect_issues(classifier.as_ref(), out.snapshots)
}

fn menu_class_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("dropdown-menu".to_string()),
        Just("nav-popup".to_string()),
        Just("context-menu".to_string()),
        Just("modal-dialog".to_string()),
        Just("listbox".to_string()),
        Just("tooltip".to_string()),
    ]
}

fn transparent_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("transparent".to_string()),
        Just("rgba(0, 0, 0, 0)".to_string()),
        Just("rgba(255, 255, 255, 0)".to_string()),
    ]
}

proptest! {
    #[test]
    fn transparent_positioned_menus_are_flagged(
        class in menu_class_strategy(),
        background in transparent_strategy(),
        position in prop_oneof![Just("absolute"), Just("fixed")],
        z in 101i64..100_000,
        width in 40.0f64..1700.0,
        height in 40.0f64..970.0,
    ) {
        let style = ComputedStyle {
            background_color: background,
            color: "rgb(230, 230, 230)".to_string(),
            position: position.to_string(),
            z_index: z.to_string(),
            ..ComputedStyle::default()
        };
        let tree = page_with(element("div", &[class], style, width, height));
        let issues = detect(&tree);
        prop_assert_eq!(issues.len(), 1);
        prop_assert!(issues[0].tags.contains(&ProblemTag::TransparentMenuBackground));
    }

    #[test]
    fn in_flow_or_low_stacking_boxes_are_not_menus(
        class in menu_class_strategy(),
        z in -10i64..=100,
        static_position in any::<bool>(),
    ) {
        let style = ComputedStyle {
            background_color: "transparent".to_string(),
            color: "rgb(230, 230, 230)".to_string(),
            position: if static_position { "static" } else { "absolute" }.to_string(),
            z_index: if static_position { "9999".to_string() } else { z.to_string() },
            ..ComputedStyle::default()
        };
        let tree = page_with(element("div", &[class], style, 200.0, 300.0));
        let flagged = detect(&tree)
            .iter()
            .any(|i| i.tags.contains(&ProblemTag::TransparentMenuBackground));
        prop_assert!(!flagged);
    }

    #[test]
    fn near_white_text_on_white_is_poor_contrast(
        bg in 241u8..=255,
        fg in 200u8..=255,
    ) {
        let style = ComputedStyle {
            background_color: format!("rgb({bg}, {bg}, {bg})"),
            color: format!("rgb({fg}, {fg}, {fg})"),
            ..ComputedStyle::default()
        };
        let tree = page_with(element("p", &["card".to_string()], style, 300.0, 60.0));
        let issues = detect(&tree);
        prop_assert_eq!(issues.len(), 1);
        prop_assert!(issues[0].tags.contains(&ProblemTag::PoorContrast));
        prop_assert!(issues[0].tags.contains(&ProblemTag::WhiteBackground));
    }

    #[test]
    fn dark_readable_pages_are_clean(
        bg in 0u8..40,
        fg in 200u8..=255,
    ) {
        let style = ComputedStyle {
            background_color: format!("rgb({bg}, {bg}, {bg})"),
            color: format!("rgb({fg}, {fg}, {fg})"),
            ..ComputedStyle::default()
        };
        let tree = page_with(element("section", &["panel".to_string()], style, 600.0, 400.0));
        prop_assert!(detect(&tree).is_empty());
    }
}

#[test]
fn backdrop_overlays_are_excluded() {
    let style = ComputedStyle {
        background_color: "transparent".to_string(),
        position: "fixed".to_string(),
        z_index: "1000".to_string(),
        ..ComputedStyle::default()
    };
    let tree = page_with(element("div", &["modal-backdrop".to_string()], style, 400.0, 400.0));
    assert!(detect(&tree).is_empty());
}

#[test]
fn zero_size_nodes_are_never_reported() {
    let style = ComputedStyle {
        background_color: "rgb(255, 255, 255)".to_string(),
        color: "rgb(255, 255, 255)".to_string(),
        ..ComputedStyle::default()
    };
    let tree = page_with(element("div", &["card".to_string()], style, 0.0, 0.0));
    assert!(detect(&tree).is_empty());
}
