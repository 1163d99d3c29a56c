//! Text normalizers applied to the generation text before synthesis.
//!
//! A normalizer is picked by name per request:
//!
//! * `None` leaves the text untouched,
//! * built-ins are registered in code (`english`),
//! * anything else names a directory `<root>/<name>/normaliser.json` holding
//!   regex rewrite rules (see [`rules`]).
//!
//! A normalizer that cannot be found or loaded never fails the request: the
//! registry logs why and hands back the identity transform.

pub mod english;
pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use english::EnglishNormalizer;
pub use rules::RuleNormalizer;

/// Choice name of the identity transform.
pub const NONE_CHOICE: &str = "None";

/// Rule file expected inside each plugin directory.
pub const NORMALISER_FILE: &str = "normaliser.json";

/// Rewrites generation text into a form the engine reads well.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Returns the text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl TextNormalizer for Identity {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

pub struct NormalizerRegistry {
    root: Option<PathBuf>,
    builtins: Vec<(String, Arc<dyn TextNormalizer>)>,
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NormalizerRegistry {
    /// Registry with the built-in normalizers and an optional plugin root.
    pub fn new(root: Option<PathBuf>) -> Self {
        let mut registry = Self::empty(root);
        registry.register("english", Arc::new(EnglishNormalizer::default()));
        registry
    }

    /// Registry without built-ins.
    pub fn empty(root: Option<PathBuf>) -> Self {
        Self { root, builtins: Vec::new() }
    }

    /// Add or replace a built-in under `name`.
    pub fn register(&mut self, name: &str, normalizer: Arc<dyn TextNormalizer>) {
        match self.builtins.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = normalizer,
            None => self.builtins.push((name.to_string(), normalizer)),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// `None`, then the built-ins in registration order, then every plugin
    /// directory holding a rule file, sorted.
    pub fn choices(&self) -> Vec<String> {
        let mut out = vec![NONE_CHOICE.to_string()];
        out.extend(self.builtins.iter().map(|(n, _)| n.clone()));
        let mut plugins: Vec<String> = self
            .plugin_dirs()
            .into_iter()
            .filter(|name| !out.contains(name))
            .collect();
        plugins.sort();
        out.extend(plugins);
        out
    }

    fn plugin_dirs(&self) -> Vec<String> {
        let Some(root) = &self.root else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.path().join(NORMALISER_FILE).is_file())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect()
    }

    /// Look up `name`, falling back to [`Identity`] with a logged reason.
    pub fn resolve(&self, name: &str) -> Arc<dyn TextNormalizer> {
        let name = name.trim();
        if name.is_empty() || name == NONE_CHOICE {
            return Arc::new(Identity);
        }
        if let Some((_, n)) = self.builtins.iter().find(|(n, _)| n == name) {
            return n.clone();
        }
        if name.contains(['/', '\\']) || name == ".." || name == "." {
            tracing::warn!("Normaliser name '{}' is not a plain directory name; using original text", name);
            return Arc::new(Identity);
        }
        let Some(root) = &self.root else {
            tracing::warn!("No normaliser directory configured for '{}'; using original text", name);
            return Arc::new(Identity);
        };
        let file = root.join(name).join(NORMALISER_FILE);
        if !file.is_file() {
            tracing::warn!("Normaliser file {} not found; using original text", file.display());
            return Arc::new(Identity);
        }
        match RuleNormalizer::from_file(&file) {
            Ok(rules) => Arc::new(rules),
            Err(e) => {
                tracing::warn!("Cannot load normaliser '{}': {:#}; using original text", name, e);
                Arc::new(Identity)
            }
        }
    }

    /// Resolve `name` and run it over `text`.
    pub fn apply(&self, name: &str, text: &str) -> String {
        self.resolve(name).normalize(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
