//! Style-script parser.
//!
//! A script is plain text interleaved with `{label}` markers:
//!
//! ```text
//! Hello there. {Whisper} Come closer. {Shouting} NOW!
//! ```
//!
//! Text before the first label belongs to [`DEFAULT_STYLE`].  Labels only
//! match on a single line (`\{(.*?)\}`, non-greedy).

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Style used for text that precedes any label, and the fallback for
/// unresolved labels.
pub const DEFAULT_STYLE: &str = "Regular";

static RE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(.*?)\}").unwrap());

/// One contiguous span of text spoken in a single style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub style: String,
    pub text: String,
}

/// Split `script` into ordered `(style, text)` segments.
///
/// Text spans are trimmed and empty spans dropped, so two labels with
/// nothing between them yield a single segment for the later label.
pub fn parse_script(script: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut style = DEFAULT_STYLE.to_string();
    let mut cursor = 0;

    let mut push = |style: &str, span: &str| {
        let text = span.trim();
        if !text.is_empty() {
            segments.push(Segment { style: style.to_string(), text: text.to_string() });
        }
    };

    for caps in RE_LABEL.captures_iter(script) {
        let Some(whole) = caps.get(0) else { continue };
        push(&style, &script[cursor..whole.start()]);
        style = caps[1].trim().to_string();
        cursor = whole.end();
    }
    push(&style, &script[cursor..]);

    segments
}

/// Distinct styles referenced by segments of `script`, in first-use order.
pub fn styles_in(script: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    parse_script(script)
        .into_iter()
        .filter(|s| seen.insert(s.style.clone()))
        .map(|s| s.style)
        .collect()
}

/// Styles the script speaks in that are not among `available`.
///
/// Empty means the script can be generated.  Labels that carry no text are
/// not counted.
pub fn missing_styles<'a, I>(script: &str, available: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let available: HashSet<&str> = available.into_iter().filter(|n| !n.is_empty()).collect();
    parse_script(script)
        .into_iter()
        .map(|s| s.style)
        .filter(|style| !available.contains(style.as_str()))
        .collect()
}

/// Append `{name} ` to the script, using `None` for a blank name.
pub fn insert_label(script: &str, name: &str) -> String {
    let name = if name.is_empty() { "None" } else { name };
    format!("{}{{{}}} ", script, name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(style: &str, text: &str) -> Segment {
        Segment { style: style.into(), text: text.into() }
    }

    #[test]
    fn test_no_labels_is_single_default_segment() {
        assert_eq!(parse_script("  Just some text.  "), vec![seg("Regular", "Just some text.")]);
    }

    #[test]
    fn test_empty_script() {
        assert!(parse_script("").is_empty());
        assert!(parse_script("   \n ").is_empty());
    }

    #[test]
    fn test_labels_switch_style() {
        let s = parse_script("Hello. {Whisper} Come closer. { Shouting } NOW!");
        assert_eq!(
            s,
            vec![
                seg("Regular", "Hello."),
                seg("Whisper", "Come closer."),
                seg("Shouting", "NOW!"),
            ]
        );
    }

    #[test]
    fn test_consecutive_labels_drop_empty_segment() {
        let s = parse_script("{Sad}{Happy} yay {Angry}");
        assert_eq!(s, vec![seg("Happy", "yay")]);
    }

    #[test]
    fn test_leading_label_has_no_default_segment() {
        let s = parse_script("{Narrator} Once upon a time.");
        assert_eq!(s, vec![seg("Narrator", "Once upon a time.")]);
    }

    #[test]
    fn test_label_does_not_span_lines() {
        let s = parse_script("a {not\na label} b");
        assert_eq!(s, vec![seg("Regular", "a {not\na label} b")]);
    }

    #[test]
    fn test_rejoin_reconstructs_text() {
        let script = "One.{A}Two.{B}Three.{A}Four.";
        let joined: String = parse_script(script).into_iter().map(|s| s.text).collect();
        assert_eq!(joined, RE_LABEL.replace_all(script, "").into_owned());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let script = "x {A} y {B} z";
        assert_eq!(parse_script(script), parse_script(script));
    }

    #[test]
    fn test_missing_styles() {
        let script = "hi {Happy} yo {Sad} no";
        let missing = missing_styles(script, ["Regular", "Happy"]);
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["Sad".to_string()]);
        assert!(missing_styles(script, ["Regular", "Happy", "Sad"]).is_empty());
    }

    #[test]
    fn test_styles_in_first_use_order() {
        assert_eq!(styles_in("a {B} b {A} c {B} d"), vec!["Regular", "B", "A"]);
    }

    #[test]
    fn test_insert_label() {
        assert_eq!(insert_label("Hi ", "Happy"), "Hi {Happy} ");
        assert_eq!(insert_label("", ""), "{None} ");
    }
}
