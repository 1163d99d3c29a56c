//! # f5_studio
//!
//! Voice-cloning text-to-speech front-end for F5-TTS / E2-TTS checkpoints.
//!
//! The crate owns everything around the synthesis network: style-script
//! parsing, model selection and caching, text normalizers, batching and
//! cross-fading, multi-speaker dialogue and a spoken chat loop.  The
//! network, vocoder and transcriber run in an external worker process
//! reached through [`bridge::WorkerBridge`]; chat replies come from any
//! OpenAI-compatible endpoint via [`llm::OpenAiChat`].
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use f5_studio::{Feedback, GenerationParams, Studio, StudioSettings, TtsRequest};
//!
//! let settings = StudioSettings {
//!     worker_script: Some(PathBuf::from("worker/f5_worker.py")),
//!     ..Default::default()
//! };
//! let mut studio = Studio::with_worker(settings).unwrap();
//!
//! let request = TtsRequest {
//!     ref_audio: Some(Path::new("voice.wav")),
//!     ref_text: "",
//!     gen_text: "Hello from Rust!",
//!     params: GenerationParams::default(),
//! };
//! let mut feedback = Feedback::new();
//! let result = studio.basic_tts(&request, "english", &mut feedback).unwrap();
//! if let Some(out) = result.output {
//!     f5_studio::audio::write_wav(&out.waveform, Path::new("out.wav")).unwrap();
//! }
//! ```
//!
//! ## Multi-style scripts
//!
//! ```text
//! {Regular} Hello, I'd like to order a sandwich please.
//! {Surprised} What do you mean you're out of bread?
//! ```
//!
//! Each `{Name}` switches to the speech type registered under that name;
//! text before the first label uses `Regular`.
//!
//! ## Pipeline
//! 1. **Normalize**: optional text rewrite (built-in English or a rule file).
//! 2. **Reference**: clip to 12 s, transcribe when no transcript is given.
//! 3. **Batch**: split the text so each batch fits the reference's pace.
//! 4. **Synthesize**: one engine call per batch.
//! 5. **Join**: cross-fade batches, optionally strip long silences.

pub mod app;
pub mod audio;
pub mod bridge;
pub mod chat;
pub mod config;
pub mod custom_store;

// `hf://` locators download through hf-hub on desktop; on iOS/Android they
// fail with a clear error and models are bundled with the app.
pub mod download;

pub mod engine;
pub mod error;
pub mod feedback;
pub mod infer;
pub mod llm;
pub mod model;
pub mod multistyle;
pub mod normalize;
pub mod script;
pub mod spectrogram;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use app::{Studio, StudioSettings};
pub use config::{Backbone, CustomModelSpec, LoadSpec, ModelConfig};
pub use engine::{ChatModel, ModelLoader, SpeechModel, Spectrogram, Transcriber, Waveform};
pub use error::StudioError;
pub use feedback::{Feedback, Notice};
pub use infer::{GenerationParams, Inference, TtsRequest};
pub use model::{ModelChoice, ModelRegistry};
pub use multistyle::SpeechTypeBoard;
pub use normalize::{NormalizerRegistry, TextNormalizer};
