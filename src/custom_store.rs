//! Last-used custom model record.
//!
//! A three-line UTF-8 text file: checkpoint locator, vocab locator, config
//! JSON.  Read when the user switches to the custom model and rewritten
//! whenever a custom field changes, so the values survive restarts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{CustomModelSpec, ModelConfig};

/// File name of the record inside the cache directory.
pub const RECORD_FILE: &str = "last_used_custom_model_info_v1.txt";

#[derive(Debug, Clone)]
pub struct CustomModelStore {
    path: PathBuf,
}

impl CustomModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store rooted in `cache_dir`, using the standard file name.
    pub fn in_dir(cache_dir: &Path) -> Self {
        Self::new(cache_dir.join(RECORD_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted record.
    ///
    /// A missing file, a short file or an unparseable config all fall back
    /// to the built-in default triple.  When the file is missing its parent
    /// directory is created so the next [`save`](Self::save) succeeds.
    pub fn load(&self) -> CustomModelSpec {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match parse_record(&contents) {
                Some(spec) => spec,
                None => {
                    tracing::warn!(
                        "Ignoring corrupt custom model record {}; using defaults",
                        self.path.display()
                    );
                    CustomModelSpec::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!("Cannot create {}: {}", parent.display(), e);
                    }
                }
                CustomModelSpec::default()
            }
            Err(e) => {
                tracing::warn!("Cannot read {}: {}; using defaults", self.path.display(), e);
                CustomModelSpec::default()
            }
        }
    }

    /// Rewrite the record with `spec`.
    pub fn save(&self, spec: &CustomModelSpec) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        let contents = format!(
            "{}\n{}\n{}\n",
            one_line(&spec.checkpoint),
            one_line(&spec.vocab),
            one_line(&spec.config)
        );
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Cannot write custom model record {}", self.path.display()))
    }
}

/// Newlines would shift the three-line layout.
fn one_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn parse_record(contents: &str) -> Option<CustomModelSpec> {
    let mut lines = contents.lines().map(str::trim);
    let checkpoint = lines.next()?;
    let vocab = lines.next()?;
    let config = lines.next()?;
    if checkpoint.is_empty() || ModelConfig::from_json(config).is_err() {
        return None;
    }
    Some(CustomModelSpec::new(checkpoint, vocab, config))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
