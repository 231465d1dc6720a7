//! Problem tags, issues, and issue signatures.

use crate::collect::StyleSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use umbra_common::{IssueFingerprint, NodeId};

/// A class of dark-mode rendering defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemTag {
    TransparentMenuBackground,
    PoorContrast,
    WhiteBackground,
    HiddenContent,
    LowOpacity,
    LightBorder,
}

impl ProblemTag {
    pub const ALL: [ProblemTag; 6] = [
        ProblemTag::TransparentMenuBackground,
        ProblemTag::PoorContrast,
        ProblemTag::WhiteBackground,
        ProblemTag::HiddenContent,
        ProblemTag::LowOpacity,
        ProblemTag::LightBorder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemTag::TransparentMenuBackground => "transparent_menu_background",
            ProblemTag::PoorContrast => "poor_contrast",
            ProblemTag::WhiteBackground => "white_background",
            ProblemTag::HiddenContent => "hidden_content",
            ProblemTag::LowOpacity => "low_opacity",
            ProblemTag::LightBorder => "light_border",
        }
    }

    /// Plain-language phrasing used in generation requests.
    pub fn phrase(&self) -> &'static str {
        match self {
            ProblemTag::TransparentMenuBackground => {
                "a floating menu or dialog has a transparent background, so page content shows through it"
            }
            ProblemTag::PoorContrast => "text contrast against its background is too low to read",
            ProblemTag::WhiteBackground => "a bright white background glares in dark mode",
            ProblemTag::HiddenContent => "text content is hidden",
            ProblemTag::LowOpacity => "the element is faded to low opacity",
            ProblemTag::LightBorder => "a light border stands out against the dark theme",
        }
    }
}

impl fmt::Display for ProblemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProblemTag::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown problem tag '{}'", s))
    }
}

/// Lookup key for the pattern store: sorted tags, element type, sorted classes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueSignature {
    pub tags: BTreeSet<ProblemTag>,
    pub element_type: String,
    pub classes: BTreeSet<String>,
}

impl IssueSignature {
    pub fn new(
        tags: impl IntoIterator<Item = ProblemTag>,
        element_type: impl Into<String>,
        classes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            tags: tags.into_iter().collect(),
            element_type: element_type.into().to_ascii_lowercase(),
            classes: classes.into_iter().collect(),
        }
    }

    /// Canonical key: `tag+tag|element|class.class`.
    ///
    /// Backslashes, `.`, `|` and `+` inside the element type or a class name
    /// are backslash-escaped, so distinct class sets never share a key.
    pub fn key(&self) -> String {
        let tags: Vec<&str> = self.tags.iter().map(|t| t.as_str()).collect();
        let classes: Vec<String> = self.classes.iter().map(|c| escape_part(c)).collect();
        format!(
            "{}|{}|{}",
            tags.join("+"),
            escape_part(&self.element_type),
            classes.join(".")
        )
    }

    /// Inverse of [`IssueSignature::key`].
    pub fn parse_key(key: &str) -> Result<Self, String> {
        let (tags, element, classes) = match split_unescaped(key, '|')[..] {
            [t, e, c] => (t, e, c),
            _ => return Err(format!("malformed signature key '{}'", key)),
        };
        let tags = tags
            .split('+')
            .filter(|t| !t.is_empty())
            .map(ProblemTag::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if element.is_empty() {
            return Err(format!("signature key '{}' has no element type", key));
        }
        Ok(Self::new(
            tags,
            unescape_part(element),
            split_unescaped(classes, '.')
                .into_iter()
                .filter(|c| !c.is_empty())
                .map(unescape_part),
        ))
    }
}

fn escape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for ch in part.chars() {
        if matches!(ch, '\\' | '.' | '|' | '+') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn unescape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.extend(chars.next()),
            _ => out.push(ch),
        }
    }
    out
}

/// Split on `sep` where it is not preceded by an escaping backslash.
/// Segments keep their escapes.
fn split_unescaped(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == sep {
            parts.push(&text[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

impl fmt::Display for IssueSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A detected defect on one node. Lives for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub node: NodeId,
    pub tags: BTreeSet<ProblemTag>,
    pub snapshot: StyleSnapshot,
    pub detected_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(snapshot: StyleSnapshot, tags: BTreeSet<ProblemTag>) -> Self {
        Self {
            node: snapshot.node,
            tags,
            snapshot,
            detected_at: Utc::now(),
        }
    }

    pub fn signature(&self) -> IssueSignature {
        IssueSignature::new(
            self.tags.iter().copied(),
            self.snapshot.element_type.clone(),
            self.snapshot.classes.iter().cloned(),
        )
    }

    pub fn fingerprint(&self) -> IssueFingerprint {
        IssueFingerprint::compute(&self.snapshot.identity_path, &self.signature().key())
    }

    /// Human-readable description of every tag.
    pub fn describe(&self) -> String {
        let phrases: Vec<&str> = self.tags.iter().map(|t| t.phrase()).collect();
        format!(
            "<{}> at {}: {}",
            self.snapshot.element_type,
            self.snapshot.identity_path,
            phrases.join("; ")
        )
    }
}
