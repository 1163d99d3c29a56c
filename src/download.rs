//! Checkpoint / vocab locator resolution.
//!
//! A locator is either a local path or `hf://<user>/<repo>/<path/in/repo>`.
//! Hub locators are downloaded into the HuggingFace cache
//! (`~/.cache/huggingface/hub` by default) and resolved to the cached file.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::error::StudioError;

const HF_SCHEME: &str = "hf://";

/// A parsed `hf://` locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubLocator {
    /// `user/repo`
    pub repo_id: String,
    /// Path of the file inside the repository.
    pub filename: String,
}

impl HubLocator {
    /// Parse `hf://user/repo/file`.  Returns `Ok(None)` for non-hub locators.
    pub fn parse(locator: &str) -> Result<Option<Self>, StudioError> {
        let Some(rest) = locator.trim().strip_prefix(HF_SCHEME) else {
            return Ok(None);
        };
        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(repo), Some(file))
                if !user.is_empty() && !repo.is_empty() && !file.is_empty() =>
            {
                Ok(Some(Self { repo_id: format!("{}/{}", user, repo), filename: file.to_string() }))
            }
            _ => Err(StudioError::BadLocator(locator.to_string())),
        }
    }
}

/// Download a single file from a HuggingFace repository.
#[cfg(not(any(target_os = "ios", target_os = "android")))]
fn hf_download(loc: &HubLocator) -> Result<PathBuf> {
    use hf_hub::api::sync::Api;

    tracing::info!("Fetching {} from {}", loc.filename, loc.repo_id);
    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;
    api.model(loc.repo_id.clone())
        .get(&loc.filename)
        .with_context(|| format!("Failed to download '{}' from '{}'", loc.filename, loc.repo_id))
}

#[cfg(any(target_os = "ios", target_os = "android"))]
fn hf_download(loc: &HubLocator) -> Result<PathBuf> {
    anyhow::bail!(
        "Hub locators are unavailable on mobile; bundle '{}' from '{}' with the app",
        loc.filename,
        loc.repo_id
    )
}

/// Resolve a locator to a local path.
///
/// Empty input resolves to `None` (engine default).  Local paths are trimmed
/// and returned as-is; existence is checked by the engine that opens them.
pub fn resolve(locator: &str) -> Result<Option<PathBuf>> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Ok(None);
    }
    match HubLocator::parse(locator)? {
        Some(hub) => hf_download(&hub).map(Some),
        None => Ok(Some(PathBuf::from(locator))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hub_locator() {
        let loc = HubLocator::parse("hf://SWivid/F5-TTS/F5TTS_v1_Base/model_1250000.safetensors")
            .unwrap()
            .unwrap();
        assert_eq!(loc.repo_id, "SWivid/F5-TTS");
        assert_eq!(loc.filename, "F5TTS_v1_Base/model_1250000.safetensors");
    }

    #[test]
    fn test_local_path_is_not_hub() {
        assert_eq!(HubLocator::parse("/models/a.pt").unwrap(), None);
    }

    #[test]
    fn test_incomplete_hub_locator_is_error() {
        assert!(HubLocator::parse("hf://SWivid/F5-TTS").is_err());
        assert!(HubLocator::parse("hf://user//file").is_err());
    }

    #[test]
    fn test_resolve_local_and_empty() {
        assert_eq!(resolve("  ").unwrap(), None);
        assert_eq!(resolve(" ./ckpt/model.pt ").unwrap(), Some(PathBuf::from("./ckpt/model.pt")));
    }
}
