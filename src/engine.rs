//! Seams to the external inference collaborators.
//!
//! The synthesis network, vocoder, transcriber and chat model all live
//! outside this crate.  Each is reached through one of the traits below;
//! [`crate::bridge`] and [`crate::llm`] provide the production
//! implementations and the tests use in-memory fakes.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::LoadSpec;

/// Mono PCM audio, samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Mel spectrogram, frame-major: `data[frame * n_mels + mel]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrogram {
    pub n_mels: usize,
    pub data: Vec<f32>,
}

impl Spectrogram {
    pub fn frames(&self) -> usize {
        if self.n_mels == 0 {
            0
        } else {
            self.data.len() / self.n_mels
        }
    }

    /// Append the frames of `other`.  An empty spectrogram adopts the other's
    /// mel count.
    pub fn extend(&mut self, other: &Spectrogram) {
        if self.n_mels == 0 {
            self.n_mels = other.n_mels;
        }
        if other.n_mels == self.n_mels {
            self.data.extend_from_slice(&other.data);
        } else if other.n_mels != 0 {
            tracing::warn!(
                "Dropping spectrogram batch with {} mels (expected {})",
                other.n_mels,
                self.n_mels
            );
        }
    }
}

/// A prepared reference clip: the file the engine reads and its samples.
#[derive(Debug, Clone)]
pub struct Reference<'a> {
    pub audio_path: &'a Path,
    pub audio: &'a Waveform,
    /// Transcript of the clip, ending in punctuation and a space.
    pub text: &'a str,
}

/// One batch of text to speak in the reference voice.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub reference: Reference<'a>,
    pub text: &'a str,
    pub nfe_step: u32,
    pub speed: f32,
}

/// Output of one batch: vocoded audio plus the mel frames it came from.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub waveform: Waveform,
    pub spectrogram: Spectrogram,
}

/// A loaded checkpoint + vocoder pair.
pub trait SpeechModel: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis>;
}

/// Turns a [`LoadSpec`] into a ready [`SpeechModel`].  Its locators
/// are already resolved to local paths.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn SpeechModel>>;
}

/// Speech-to-text.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// Sampling settings for chat replies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatSampling {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ChatSampling {
    fn default() -> Self {
        Self { max_new_tokens: 512, temperature: 0.7, top_p: 0.95 }
    }
}

/// Chat completion over a full transcript.
pub trait ChatModel: Send + Sync {
    fn respond(&self, messages: &[ChatMessage], sampling: &ChatSampling) -> Result<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    pub const FAKE_RATE: u32 = 24_000;
    pub const FAKE_MELS: usize = 4;

    /// Deterministic engine: one sample per input byte, value derived from
    /// the byte and the reference text length.  Records every batch text.
    #[derive(Default)]
    pub struct FakeModel {
        pub batches: Mutex<Vec<String>>,
    }

    impl SpeechModel for FakeModel {
        fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Synthesis> {
            self.batches.lock().unwrap().push(request.text.to_string());
            let bias = request.reference.text.len() as f32 / 1000.0;
            let samples: Vec<f32> = request
                .text
                .bytes()
                .map(|b| ((b as f32 / 255.0) * 0.5 + bias).min(1.0))
                .collect();
            let frames = request.text.len().max(1);
            Ok(Synthesis {
                waveform: Waveform::new(samples, FAKE_RATE),
                spectrogram: Spectrogram {
                    n_mels: FAKE_MELS,
                    data: (0..frames * FAKE_MELS).map(|i| i as f32).collect(),
                },
            })
        }
    }

    /// Loader that counts loads and hands out fresh [`FakeModel`]s.
    #[derive(Default)]
    pub struct FakeLoader {
        pub loads: AtomicUsize,
        pub specs: Mutex<Vec<LoadSpec>>,
    }

    impl FakeLoader {
        pub fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for FakeLoader {
        fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn SpeechModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.specs.lock().unwrap().push(spec.clone());
            Ok(Arc::new(FakeModel::default()))
        }
    }

    /// Returns a fixed transcript and counts calls.
    pub struct FakeTranscriber {
        pub text: String,
        pub calls: AtomicUsize,
    }

    impl FakeTranscriber {
        pub fn new(text: &str) -> Self {
            Self { text: text.to_string(), calls: AtomicUsize::new(0) }
        }
    }

    impl Transcriber for FakeTranscriber {
        fn transcribe(&self, _audio: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    /// Echoes the last user message back, prefixed.
    pub struct EchoChat;

    impl ChatModel for EchoChat {
        fn respond(&self, messages: &[ChatMessage], _sampling: &ChatSampling) -> Result<String> {
            let last = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or("");
            Ok(format!("You said: {}", last))
        }
    }

    /// Write `secs` seconds of a 220 Hz tone to `path`.
    pub fn write_tone(path: &Path, secs: f32) {
        let n = (FAKE_RATE as f32 * secs) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| (i as f32 * 220.0 * std::f32::consts::TAU / FAKE_RATE as f32).sin() * 0.5)
            .collect();
        crate::audio::write_wav(&Waveform::new(samples, FAKE_RATE), path).unwrap();
    }
}
