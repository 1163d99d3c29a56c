//! Application context.
//!
//! [`Studio`] owns everything that outlives a single request: the model
//! selector and its loaded handles, the normalizer registry, the
//! transcriber and the lazily loaded chat model.  Front-ends hold one
//! `Studio` and pass it to every handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bridge::WorkerBridge;
use crate::chat::{ChatSession, SpokenReply};
use crate::custom_store::CustomModelStore;
use crate::engine::{ChatModel, ModelLoader, Transcriber, Waveform};
use crate::feedback::Feedback;
use crate::infer::{self, Inference, TtsRequest};
use crate::llm::{OpenAiChat, DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL};
use crate::model::{ModelChoice, ModelRegistry};
use crate::multistyle::{self, SpeechTypeBoard};
use crate::normalize::NormalizerRegistry;

/// Studio settings, read from a JSON file.  Every field has a default.
///
/// ```json
/// {
///   "cache_dir": ".cache",
///   "normalisers_dir": "normalisers",
///   "worker_script": "worker/f5_worker.py",
///   "chat_endpoint": "http://127.0.0.1:8000/v1"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudioSettings {
    /// Holds the last-used custom model record.
    pub cache_dir: PathBuf,
    /// Root of the file-backed normalizer plugins.
    pub normalisers_dir: PathBuf,
    /// Inference worker script.
    pub worker_script: Option<PathBuf>,
    /// Interpreter for the worker script; `python3`/`python` when unset.
    pub python: Option<String>,
    pub chat_endpoint: String,
    pub chat_model: String,
    /// Load the default model at startup instead of on first request.
    pub preload: bool,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
            normalisers_dir: PathBuf::from("normalisers"),
            worker_script: None,
            python: None,
            chat_endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            preload: true,
        }
    }
}

impl StudioSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid settings JSON")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("In {}", path.display()))
    }
}

pub struct Studio {
    settings: StudioSettings,
    models: ModelRegistry,
    normalizers: NormalizerRegistry,
    transcriber: Arc<dyn Transcriber>,
    chat: Option<Arc<dyn ChatModel>>,
}

impl Studio {
    pub fn new(settings: StudioSettings, loader: Arc<dyn ModelLoader>, transcriber: Arc<dyn Transcriber>) -> Self {
        let store = CustomModelStore::in_dir(&settings.cache_dir);
        let normalizers = NormalizerRegistry::new(Some(settings.normalisers_dir.clone()));
        Self {
            models: ModelRegistry::new(loader, store),
            normalizers,
            transcriber,
            chat: None,
            settings,
        }
    }

    /// Studio backed by the inference worker named in `settings`.
    pub fn with_worker(settings: StudioSettings) -> Result<Self> {
        let script = settings
            .worker_script
            .clone()
            .context("No inference worker script configured (--worker)")?;
        let bridge = WorkerBridge::python(settings.python.as_deref(), &script)?;
        let mut studio = Self::new(settings, Arc::new(bridge.clone()), Arc::new(bridge));
        if studio.settings.preload {
            studio.models.warm_up().context("Failed to preload the default model")?;
        }
        Ok(studio)
    }

    pub fn settings(&self) -> &StudioSettings {
        &self.settings
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelRegistry {
        &mut self.models
    }

    pub fn normalizers(&self) -> &NormalizerRegistry {
        &self.normalizers
    }

    pub fn normalizers_mut(&mut self) -> &mut NormalizerRegistry {
        &mut self.normalizers
    }

    pub fn transcriber(&self) -> &dyn Transcriber {
        self.transcriber.as_ref()
    }

    pub fn model_choice(&self) -> &ModelChoice {
        self.models.choice()
    }

    /// Single-voice generation with the chosen normalizer applied first.
    pub fn basic_tts(
        &mut self,
        request: &TtsRequest<'_>,
        normalizer: &str,
        feedback: &mut Feedback,
    ) -> Result<Inference> {
        let text = self.normalizers.apply(normalizer, request.gen_text);
        let request = TtsRequest { gen_text: &text, ..request.clone() };
        infer::infer(&mut self.models, self.transcriber.as_ref(), &request, feedback)
    }

    /// Multi-style generation from `board`.  Transcripts filled in along
    /// the way are written back to the board rows.
    pub fn multistyle(
        &mut self,
        board: &mut SpeechTypeBoard,
        script: &str,
        remove_silence: bool,
        normalizer: &str,
        feedback: &mut Feedback,
    ) -> Result<Option<Waveform>> {
        let normalizer = self.normalizers.resolve(normalizer);
        let mut types = board.speech_types();
        let audio = multistyle::generate(
            &mut self.models,
            self.transcriber.as_ref(),
            script,
            &mut types,
            remove_silence,
            normalizer.as_ref(),
            feedback,
        )?;
        board.apply_ref_texts(&types.row_ref_texts());
        Ok(audio)
    }

    pub fn chat_model_loaded(&self) -> bool {
        self.chat.is_some()
    }

    /// Connect the configured chat model if not already loaded.
    pub fn load_chat_model(&mut self, feedback: &mut Feedback) -> Result<()> {
        if self.chat.is_some() {
            return Ok(());
        }
        feedback.info(format!("Loading chat model {}...", self.settings.chat_model));
        let chat = OpenAiChat::from_env(&self.settings.chat_endpoint, &self.settings.chat_model)?;
        self.chat = Some(Arc::new(chat));
        Ok(())
    }

    /// Use `chat` as the chat model.
    pub fn set_chat_model(&mut self, chat: Arc<dyn ChatModel>) {
        self.chat = Some(chat);
    }

    /// One user turn in `session`.
    pub fn chat_turn(&self, session: &mut ChatSession, audio: Option<&Path>, text: &str) -> Result<Option<String>> {
        session.process_input(self.chat.as_deref(), self.transcriber.as_ref(), audio, text)
    }

    /// Speak the latest reply in `session`.
    pub fn speak_reply(&mut self, session: &mut ChatSession, feedback: &mut Feedback) -> Result<Option<SpokenReply>> {
        session.generate_audio_response(&mut self.models, self.transcriber.as_ref(), feedback)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
