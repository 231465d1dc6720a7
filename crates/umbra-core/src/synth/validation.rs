//! Payload validation for generated style text.
//!
//! Generators answer in free text. Accepted payloads are a fenced or bare
//! rule block (`selector { decl; decl }`) or a bare declaration list. The
//! result is always a normalized declaration body where every declaration
//! ends in `!important;`.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static PROPERTY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(--|-(?:webkit|moz|ms)-)?[a-zA-Z][a-zA-Z0-9-]*$").expect("regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)url\(\s*['"]?\s*([^'")\s]*)"#).expect("regex"));

static IMPORTANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*!\s*important\s*$").expect("regex"));

/// Substrings that disqualify a payload outright (compared lowercase).
const FORBIDDEN: &[&str] = &["@import", "expression(", "javascript:", "<script", "behavior:", "-moz-binding"];

/// Properties a generated patch may set. Sorted for binary search.
const KNOWN_PROPERTIES: &[&str] = &[
    "accent-color",
    "backdrop-filter",
    "background",
    "background-blend-mode",
    "background-clip",
    "background-color",
    "background-image",
    "background-origin",
    "background-position",
    "background-repeat",
    "background-size",
    "border",
    "border-block",
    "border-block-color",
    "border-bottom",
    "border-bottom-color",
    "border-bottom-style",
    "border-bottom-width",
    "border-color",
    "border-inline",
    "border-inline-color",
    "border-left",
    "border-left-color",
    "border-left-style",
    "border-left-width",
    "border-radius",
    "border-right",
    "border-right-color",
    "border-right-style",
    "border-right-width",
    "border-style",
    "border-top",
    "border-top-color",
    "border-top-style",
    "border-top-width",
    "border-width",
    "box-shadow",
    "caret-color",
    "color",
    "color-scheme",
    "column-rule-color",
    "content-visibility",
    "display",
    "fill",
    "filter",
    "forced-color-adjust",
    "isolation",
    "mix-blend-mode",
    "opacity",
    "outline",
    "outline-color",
    "outline-offset",
    "outline-style",
    "outline-width",
    "print-color-adjust",
    "scrollbar-color",
    "stop-color",
    "stroke",
    "text-decoration-color",
    "text-emphasis-color",
    "text-fill-color",
    "text-shadow",
    "text-stroke-color",
    "visibility",
    "z-index",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("unbalanced braces")]
    UnbalancedBraces,

    #[error("nested blocks are not allowed")]
    Nested,

    #[error("forbidden construct '{0}'")]
    Forbidden(String),

    #[error("url() with non-data scheme: {0}")]
    ExternalUrl(String),

    #[error("malformed declaration '{0}'")]
    MalformedDeclaration(String),

    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("markup in value '{0}'")]
    Markup(String),

    #[error("no style declarations found")]
    NoDeclarations,
}

/// One `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn to_css(&self) -> String {
        format!("{}: {} !important;", self.property, self.value)
    }
}

/// Validate a generator payload and return the normalized declaration body.
pub fn validate_payload(raw: &str) -> Result<String, PayloadError> {
    let declarations = parse_payload(raw)?;
    Ok(render(&declarations))
}

/// Validate and return the individual declarations.
pub fn parse_payload(raw: &str) -> Result<Vec<Declaration>, PayloadError> {
    let text = strip_fences(raw);
    if text.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    check_forbidden(&text)?;

    let declarations = if text.contains('{') || text.contains('}') {
        let mut out = Vec::new();
        for body in block_bodies(&text)? {
            for decl in split_declarations(&body) {
                out.push(parse_declaration(decl)?);
            }
        }
        out
    } else {
        // Bare list: every non-empty line must be a declaration.
        let parts: Vec<&str> = text.lines().flat_map(split_declarations).collect();
        if !parts.iter().any(|p| p.contains(':')) {
            return Err(PayloadError::NoDeclarations);
        }
        parts.into_iter().map(parse_declaration).collect::<Result<Vec<_>, _>>()?
    };

    if declarations.is_empty() {
        return Err(PayloadError::NoDeclarations);
    }
    Ok(declarations)
}

pub fn render(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(Declaration::to_css)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Contents of the first fenced block, or the whole text when unfenced.
fn strip_fences(raw: &str) -> String {
    let mut in_block = false;
    let mut fenced = Vec::new();
    let mut saw_fence = false;
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                break;
            }
            in_block = true;
            saw_fence = true;
            continue;
        }
        if in_block {
            fenced.push(line);
        }
    }
    if saw_fence {
        fenced.join("\n")
    } else {
        raw.trim().trim_matches('`').to_string()
    }
}

fn check_forbidden(text: &str) -> Result<(), PayloadError> {
    let lower = text.to_ascii_lowercase();
    if let Some(hit) = FORBIDDEN.iter().find(|f| lower.contains(*f)) {
        return Err(PayloadError::Forbidden((*hit).to_string()));
    }
    for cap in URL_RE.captures_iter(text) {
        let target = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !target.to_ascii_lowercase().starts_with("data:") {
            return Err(PayloadError::ExternalUrl(target.to_string()));
        }
    }
    Ok(())
}

/// Inner bodies of every top-level `{ ... }` block.
fn block_bodies(text: &str) -> Result<Vec<String>, PayloadError> {
    let mut bodies = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '{' => {
                if depth > 0 {
                    return Err(PayloadError::Nested);
                }
                depth += 1;
                current.clear();
            }
            '}' => {
                if depth == 0 {
                    return Err(PayloadError::UnbalancedBraces);
                }
                depth -= 1;
                bodies.push(std::mem::take(&mut current));
            }
            _ if depth > 0 => current.push(ch),
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PayloadError::UnbalancedBraces);
    }
    Ok(bodies)
}

/// Split on `;` outside parentheses and quotes.
fn split_declarations(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in body.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ';') if depth <= 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts.into_iter().map(str::trim).filter(|d| !d.is_empty()).collect()
}

fn parse_declaration(decl: &str) -> Result<Declaration, PayloadError> {
    let malformed = || PayloadError::MalformedDeclaration(decl.to_string());
    let (property, value) = decl.split_once(':').ok_or_else(malformed)?;
    let property = property.trim();
    let value = IMPORTANT_RE.replace(value.trim(), "");
    let value = value.trim();
    if !PROPERTY_RE.is_match(property) || value.is_empty() {
        return Err(malformed());
    }
    let property = property.to_ascii_lowercase();
    if !is_known_property(&property) {
        return Err(PayloadError::UnknownProperty(property));
    }
    if value.contains(['<', '>']) {
        return Err(PayloadError::Markup(value.to_string()));
    }
    Ok(Declaration {
        property,
        value: value.to_string(),
    })
}

/// Custom properties pass; vendor prefixes are checked against the bare name.
fn is_known_property(property: &str) -> bool {
    if property.starts_with("--") {
        return true;
    }
    let bare = ["-webkit-", "-moz-", "-ms-"]
        .iter()
        .find_map(|prefix| property.strip_prefix(prefix))
        .unwrap_or(property);
    KNOWN_PROPERTIES.binary_search(&bare).is_ok()
}
