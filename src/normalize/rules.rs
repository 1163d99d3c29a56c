//! Declarative rewrite rules loaded from `normaliser.json`.
//!
//! ```json
//! {
//!   "rules": [
//!     {"pattern": "\\bkm/h\\b", "replacement": "kilometres per hour"},
//!     {"pattern": "(\\d+)\\s*%", "replacement": "$1 percent"}
//!   ],
//!   "lowercase": false
//! }
//! ```
//!
//! Rules run in file order; replacements may use `$1`/`${name}` groups.
//! With `lowercase` set the text is lowercased first, so patterns are
//! written in lowercase.

use std::path::Path;

use anyhow::{bail, Context, Result};
use fancy_regex::Regex;
use serde::Deserialize;

use super::TextNormalizer;

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Option<Vec<RuleDef>>,
    #[serde(default)]
    lowercase: bool,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    pattern: String,
    #[serde(default)]
    replacement: String,
}

#[derive(Debug)]
pub struct RuleNormalizer {
    rules: Vec<(Regex, String)>,
    lowercase: bool,
}

impl RuleNormalizer {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(json).context("Malformed normaliser file")?;
        let Some(defs) = file.rules else {
            bail!("Normaliser file has no 'rules' transform");
        };
        let rules = defs
            .into_iter()
            .enumerate()
            .map(|(i, def)| {
                let re = Regex::new(&def.pattern)
                    .with_context(|| format!("Rule {} has an invalid pattern: {}", i, def.pattern))?;
                Ok((re, def.replacement))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, lowercase: file.lowercase })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("In {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl TextNormalizer for RuleNormalizer {
    fn normalize(&self, text: &str) -> String {
        let mut text = if self.lowercase { text.to_lowercase() } else { text.to_string() };
        for (re, replacement) in &self.rules {
            match re.try_replacen(&text, 0, replacement.as_str()) {
                Ok(out) => text = out.into_owned(),
                // Backtrack limit hit: skip this rule for this text.
                Err(e) => tracing::warn!("Normaliser rule '{}' failed: {}", re.as_str(), e),
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_in_order_with_groups() {
        let n = RuleNormalizer::from_json(
            r#"{"rules":[
                {"pattern":"(\\d+)\\s*%","replacement":"$1 percent"},
                {"pattern":"percent","replacement":"per cent"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(n.len(), 2);
        assert_eq!(n.normalize("Up 5% today"), "Up 5 per cent today");
    }

    #[test]
    fn test_lookaround_patterns_supported() {
        let n = RuleNormalizer::from_json(
            r#"{"rules":[{"pattern":"(?<=\\d)x(?=\\d)","replacement":" by "}]}"#,
        )
        .unwrap();
        assert_eq!(n.normalize("a 2x4 board, x marks"), "a 2 by 4 board, x marks");
    }

    #[test]
    fn test_lowercase_runs_before_rules() {
        let n = RuleNormalizer::from_json(
            r#"{"rules":[{"pattern":"\\bdr\\.","replacement":"Doctor"}],"lowercase":true}"#,
        )
        .unwrap();
        // Replacement text keeps its own case.
        assert_eq!(n.normalize("Ask Dr. Who"), "ask Doctor who");
    }

    #[test]
    fn test_missing_rules_key_is_error() {
        assert!(RuleNormalizer::from_json(r#"{"lowercase":true}"#).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let err = RuleNormalizer::from_json(r#"{"rules":[{"pattern":"(","replacement":""}]}"#)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Rule 0"));
    }

    #[test]
    fn test_empty_rules_is_identity() {
        let n = RuleNormalizer::from_json(r#"{"rules":[]}"#).unwrap();
        assert!(n.is_empty());
        assert_eq!(n.normalize("Same Text."), "Same Text.");
    }
}
