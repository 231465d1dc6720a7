//! Stable selectors: tag, then `#id`, then sorted classes.

use crate::collect::StyleSnapshot;

/// Escape a CSS identifier.
pub fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, ch) in ident.chars().enumerate() {
        match ch {
            'a'..='z' | 'A'..='Z' | '_' | '-' => out.push(ch),
            '0'..='9' if i > 0 => out.push(ch),
            '0'..='9' => out.push_str(&format!("\\{:x} ", ch as u32)),
            c if !c.is_ascii() => out.push(c),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

pub fn stable_selector(snapshot: &StyleSnapshot) -> String {
    let mut selector = snapshot.element_type.to_ascii_lowercase();
    if let Some(id) = snapshot.id.as_deref().filter(|id| !id.is_empty()) {
        selector.push('#');
        selector.push_str(&escape_ident(id));
    }
    for class in &snapshot.classes {
        selector.push('.');
        selector.push_str(&escape_ident(class));
    }
    selector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_leading_digits_and_punctuation() {
        assert_eq!(escape_ident("menu"), "menu");
        assert_eq!(escape_ident("2col"), "\\32 col");
        assert_eq!(escape_ident("w-1/2"), "w-1\\/2");
        assert_eq!(escape_ident("hover:bg"), "hover\\:bg");
    }
}
