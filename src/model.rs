//! Model selection and lazily loaded checkpoint handles.
//!
//! Three choices exist: the two built-ins and a user-supplied custom
//! checkpoint.  Each has its own cache slot so switching back and forth
//! never reloads; a different custom spec replaces the custom slot.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{CustomModelSpec, LoadSpec, ModelConfig, CUSTOM_NAME, E2_TTS_NAME, F5_TTS_NAME};
use crate::custom_store::CustomModelStore;
use crate::download;
use crate::engine::{ModelLoader, SpeechModel};
use crate::error::StudioError;
use crate::feedback::Feedback;

/// Turns a checkpoint/vocab locator into a local path.
pub type LocatorResolver = fn(&str) -> Result<Option<PathBuf>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "custom")]
pub enum ModelChoice {
    #[serde(rename = "F5-TTS_v1")]
    F5Tts,
    #[serde(rename = "E2-TTS")]
    E2Tts,
    Custom(CustomModelSpec),
}

impl ModelChoice {
    /// Names accepted by [`ModelRegistry::select`], default first.
    pub const NAMES: [&'static str; 3] = [F5_TTS_NAME, E2_TTS_NAME, CUSTOM_NAME];

    pub fn name(&self) -> &'static str {
        match self {
            ModelChoice::F5Tts => F5_TTS_NAME,
            ModelChoice::E2Tts => E2_TTS_NAME,
            ModelChoice::Custom(_) => CUSTOM_NAME,
        }
    }
}

pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    store: CustomModelStore,
    resolver: LocatorResolver,
    choice: ModelChoice,
    f5: Option<Arc<dyn SpeechModel>>,
    e2: Option<Arc<dyn SpeechModel>>,
    /// Keyed on the unresolved spec it was loaded from.
    custom: Option<(LoadSpec, Arc<dyn SpeechModel>)>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>, store: CustomModelStore) -> Self {
        Self {
            loader,
            store,
            resolver: download::resolve,
            choice: ModelChoice::F5Tts,
            f5: None,
            e2: None,
            custom: None,
        }
    }

    /// Replace the locator resolver (the default downloads `hf://` files).
    pub fn with_resolver(mut self, resolver: LocatorResolver) -> Self {
        self.set_resolver(resolver);
        self
    }

    pub fn set_resolver(&mut self, resolver: LocatorResolver) {
        self.resolver = resolver;
    }

    pub fn choice(&self) -> &ModelChoice {
        &self.choice
    }

    pub fn store(&self) -> &CustomModelStore {
        &self.store
    }

    /// Switch to the model called `name`.
    ///
    /// Selecting `Custom` re-reads the persisted record, falling back to the
    /// default triple when it is missing or unreadable.
    pub fn select(&mut self, name: &str) -> Result<&ModelChoice, StudioError> {
        self.choice = match name.trim() {
            F5_TTS_NAME => ModelChoice::F5Tts,
            E2_TTS_NAME => ModelChoice::E2Tts,
            CUSTOM_NAME => ModelChoice::Custom(self.store.load()),
            other => return Err(StudioError::UnknownChoice(other.to_string())),
        };
        tracing::info!("Selected model {}", self.choice.name());
        Ok(&self.choice)
    }

    /// Set the custom model fields, switch to `Custom` and persist the record.
    ///
    /// The checkpoint must be non-blank and the config must parse; on error
    /// nothing changes.
    pub fn set_custom(&mut self, checkpoint: &str, vocab: &str, config: &str) -> Result<()> {
        if checkpoint.trim().is_empty() {
            return Err(StudioError::EmptyCheckpoint.into());
        }
        ModelConfig::from_json(config)?;
        let spec = CustomModelSpec::new(checkpoint.trim(), vocab.trim(), config.trim());
        self.store.save(&spec)?;
        self.choice = ModelChoice::Custom(spec);
        Ok(())
    }

    /// Handle for the current choice, loading it on first use.
    pub fn handle(&mut self, feedback: &mut Feedback) -> Result<Arc<dyn SpeechModel>> {
        match self.choice.clone() {
            ModelChoice::F5Tts => {
                if let Some(model) = &self.f5 {
                    return Ok(model.clone());
                }
                tracing::info!("Loading {} model", F5_TTS_NAME);
                let model = self.load(&LoadSpec::f5_tts())?;
                self.f5 = Some(model.clone());
                Ok(model)
            }
            ModelChoice::E2Tts => {
                if let Some(model) = &self.e2 {
                    return Ok(model.clone());
                }
                feedback.info("Loading E2-TTS model...");
                let model = self.load(&LoadSpec::e2_tts())?;
                self.e2 = Some(model.clone());
                Ok(model)
            }
            ModelChoice::Custom(spec) => {
                let wanted = spec.to_load_spec()?;
                if let Some((loaded, model)) = &self.custom {
                    if *loaded == wanted {
                        return Ok(model.clone());
                    }
                }
                feedback.info("Loading Custom TTS model...");
                let model = self.load(&wanted)?;
                self.custom = Some((wanted, model.clone()));
                Ok(model)
            }
        }
    }

    /// Load the default model ahead of the first request.
    pub fn warm_up(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.choice, ModelChoice::F5Tts);
        let result = self.handle(&mut Feedback::new()).map(|_| ());
        self.choice = previous;
        result
    }

    fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn SpeechModel>> {
        let checkpoint = (self.resolver)(&spec.checkpoint)?
            .ok_or(StudioError::EmptyCheckpoint)?;
        let vocab = (self.resolver)(&spec.vocab)?;
        let resolved = LoadSpec {
            backbone: spec.backbone,
            checkpoint: checkpoint.to_string_lossy().into_owned(),
            vocab: vocab.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default(),
            config: spec.config.clone(),
        };
        self.loader
            .load(&resolved)
            .with_context(|| format!("Failed to load checkpoint {}", spec.checkpoint))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backbone;
    use crate::engine::fakes::FakeLoader;

    fn local(locator: &str) -> Result<Option<PathBuf>> {
        let locator = locator.trim();
        Ok((!locator.is_empty()).then(|| PathBuf::from(locator.trim_start_matches("hf://"))))
    }

    fn registry(dir: &std::path::Path) -> (Arc<FakeLoader>, ModelRegistry) {
        let loader = Arc::new(FakeLoader::default());
        let reg = ModelRegistry::new(loader.clone(), CustomModelStore::in_dir(dir)).with_resolver(local);
        (loader, reg)
    }

    #[test]
    fn test_default_choice_is_f5() {
        let dir = tempfile::tempdir().unwrap();
        let (_, reg) = registry(dir.path());
        assert_eq!(reg.choice(), &ModelChoice::F5Tts);
        assert_eq!(reg.choice().name(), "F5-TTS_v1");
    }

    #[test]
    fn test_unknown_choice_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut reg) = registry(dir.path());
        assert!(matches!(reg.select("F6"), Err(StudioError::UnknownChoice(_))));
        assert_eq!(reg.choice(), &ModelChoice::F5Tts);
    }

    #[test]
    fn test_switching_back_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (loader, mut reg) = registry(dir.path());
        let mut fb = Feedback::new();
        reg.handle(&mut fb).unwrap();
        reg.select("E2-TTS").unwrap();
        reg.handle(&mut fb).unwrap();
        reg.select("F5-TTS_v1").unwrap();
        reg.handle(&mut fb).unwrap();
        reg.select("E2-TTS").unwrap();
        reg.handle(&mut fb).unwrap();
        assert_eq!(loader.load_count(), 2);
        let infos: Vec<_> = fb.notices().iter().map(|n| n.message().to_string()).collect();
        assert_eq!(infos, vec!["Loading E2-TTS model..."]);
        let specs = loader.specs.lock().unwrap();
        assert_eq!(specs[1].backbone, Backbone::UNetT);
        assert_eq!(specs[1].vocab, "");
    }

    #[test]
    fn test_custom_reload_only_on_spec_change() {
        let dir = tempfile::tempdir().unwrap();
        let (loader, mut reg) = registry(dir.path());
        let cfg = ModelConfig::f5_v1_base().to_json();
        let mut fb = Feedback::new();

        reg.set_custom("/ckpt/a.pt", "", &cfg).unwrap();
        reg.handle(&mut fb).unwrap();
        reg.handle(&mut fb).unwrap();
        assert_eq!(loader.load_count(), 1);

        // Same checkpoint, different config: still a reload.
        reg.set_custom("/ckpt/a.pt", "", &ModelConfig::f5_small().to_json()).unwrap();
        reg.handle(&mut fb).unwrap();
        assert_eq!(loader.load_count(), 2);
    }

    #[test]
    fn test_set_custom_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut reg) = registry(dir.path());
        let err = reg.set_custom("/ckpt/a.pt", "", "{dim: 1").unwrap_err();
        assert!(err.downcast_ref::<StudioError>().is_some());
        assert_eq!(reg.choice(), &ModelChoice::F5Tts);
        assert!(!reg.store().path().exists());
    }

    #[test]
    fn test_custom_round_trip_restores_record() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut reg) = registry(dir.path());
        let cfg = ModelConfig::f5_small().to_json();
        reg.set_custom("/ckpt/ft.pt", "/ckpt/vocab.txt", &cfg).unwrap();
        reg.select("F5-TTS_v1").unwrap();
        let restored = reg.select("Custom").unwrap().clone();
        assert_eq!(restored, ModelChoice::Custom(CustomModelSpec::new("/ckpt/ft.pt", "/ckpt/vocab.txt", &cfg)));

        // A fresh registry over the same directory sees the same record.
        let (_, mut fresh) = registry(dir.path());
        assert_eq!(fresh.select("Custom").unwrap(), &restored);
    }

    #[test]
    fn test_custom_without_record_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut reg) = registry(&dir.path().join(".cache"));
        assert_eq!(reg.select("Custom").unwrap(), &ModelChoice::Custom(CustomModelSpec::default()));
    }

    #[test]
    fn test_blank_custom_checkpoint_is_rejected_before_saving() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut reg) = registry(dir.path());
        let cfg = ModelConfig::f5_small().to_json();
        reg.set_custom("/ckpt/ft.pt", "/ckpt/vocab.txt", &cfg).unwrap();

        let err = reg.set_custom("  ", "/other/vocab.txt", &cfg).unwrap_err();
        assert!(matches!(err.downcast_ref::<StudioError>(), Some(StudioError::EmptyCheckpoint)));
        // The earlier record and choice survive untouched.
        let kept = ModelChoice::Custom(CustomModelSpec::new("/ckpt/ft.pt", "/ckpt/vocab.txt", &cfg));
        assert_eq!(reg.choice(), &kept);
        assert_eq!(reg.select("Custom").unwrap(), &kept);
    }

    #[test]
    fn test_empty_custom_checkpoint_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let (loader, mut reg) = registry(dir.path());
        reg.choice = ModelChoice::Custom(CustomModelSpec::new("", "", &ModelConfig::f5_v1_base().to_json()));
        let Err(err) = reg.handle(&mut Feedback::new()) else {
            panic!("an empty checkpoint must not load");
        };
        assert!(matches!(err.downcast_ref::<StudioError>(), Some(StudioError::EmptyCheckpoint)));
        assert_eq!(loader.load_count(), 0);
    }

    #[test]
    fn test_warm_up_keeps_choice() {
        let dir = tempfile::tempdir().unwrap();
        let (loader, mut reg) = registry(dir.path());
        reg.select("E2-TTS").unwrap();
        reg.warm_up().unwrap();
        assert_eq!(reg.choice(), &ModelChoice::E2Tts);
        assert_eq!(loader.load_count(), 1);
        assert_eq!(loader.specs.lock().unwrap()[0].backbone, Backbone::DiT);
    }
}
