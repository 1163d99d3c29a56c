//! Inference dispatcher: validate a request, prepare the reference clip,
//! split the text into batches, synthesize, join and post-process.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::{self, MAX_REFERENCE_SECS};
use crate::engine::{Reference, SpeechModel, Spectrogram, SynthesisRequest, Transcriber, Waveform};
use crate::feedback::Feedback;
use crate::model::ModelRegistry;
use crate::spectrogram;

/// Batches never get shorter than this many bytes, however long the
/// reference clip is.
const MIN_BATCH_BYTES: usize = 50;

/// Reference plus batch audio should stay under this many seconds.
const MAX_CONTEXT_SECS: f32 = 22.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub remove_silence: bool,
    /// Overlap between batches, in seconds.
    pub cross_fade: f32,
    pub nfe_step: u32,
    pub speed: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { remove_silence: false, cross_fade: 0.15, nfe_step: 32, speed: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub struct TtsRequest<'a> {
    pub ref_audio: Option<&'a Path>,
    /// Blank means "transcribe the reference clip".
    pub ref_text: &'a str,
    pub gen_text: &'a str,
    pub params: GenerationParams,
}

/// Generated speech and its rendered spectrogram.
#[derive(Debug, Clone)]
pub struct Generated {
    pub waveform: Waveform,
    pub spectrogram_path: PathBuf,
}

/// Outcome of one dispatch.  `output` is `None` when validation failed;
/// the reason is in the request's [`Feedback`].
#[derive(Debug, Clone)]
pub struct Inference {
    pub output: Option<Generated>,
    /// The reference transcript, filled in when it was transcribed.
    pub ref_text: String,
}

/// A reference clip ready for the engine.
#[derive(Debug, Clone)]
pub struct PreparedReference {
    /// Clipped copy of the clip in the temp directory.
    pub audio_path: PathBuf,
    pub audio: Waveform,
    pub text: String,
}

impl PreparedReference {
    pub fn as_reference(&self) -> Reference<'_> {
        Reference { audio_path: &self.audio_path, audio: &self.audio, text: &self.text }
    }
}

/// Run one text-to-speech request against the currently selected model.
pub fn infer(
    models: &mut ModelRegistry,
    transcriber: &dyn Transcriber,
    request: &TtsRequest<'_>,
    feedback: &mut Feedback,
) -> Result<Inference> {
    let Some(ref_audio) = request.ref_audio else {
        feedback.warn("Please provide reference audio.");
        return Ok(Inference { output: None, ref_text: request.ref_text.to_string() });
    };
    if request.gen_text.trim().is_empty() {
        feedback.warn("Please enter text to generate.");
        return Ok(Inference { output: None, ref_text: request.ref_text.to_string() });
    }

    let reference = prepare_reference(ref_audio, request.ref_text, transcriber, feedback)?;
    let model = models.handle(feedback)?;
    let (waveform, spec) =
        synthesize_text(model.as_ref(), &reference, request.gen_text, &request.params)?;

    let waveform = if request.params.remove_silence {
        strip_silence_via_file(&waveform)?
    } else {
        waveform
    };
    let spectrogram_path = spectrogram::render_to_temp(&spec)?;

    Ok(Inference {
        output: Some(Generated { waveform, spectrogram_path }),
        ref_text: reference.text,
    })
}

/// Load, clip and (if needed) transcribe a reference clip.
pub fn prepare_reference(
    path: &Path,
    ref_text: &str,
    transcriber: &dyn Transcriber,
    feedback: &mut Feedback,
) -> Result<PreparedReference> {
    let original = audio::read_wav(path)
        .with_context(|| format!("Cannot read reference audio {}", path.display()))?;
    let audio = audio::clip_reference(&original, MAX_REFERENCE_SECS);
    if audio.samples.len() < original.samples.len() {
        feedback.info(format!("Audio is over {}s, clipping short.", MAX_REFERENCE_SECS));
    }
    let audio_path = audio::kept_temp_file(".wav")?;
    audio::write_wav(&audio, &audio_path)?;

    let text = if ref_text.trim().is_empty() {
        feedback.info("No reference text provided, transcribing reference audio...");
        let text = transcriber
            .transcribe(&audio_path)
            .context("Reference transcription failed")?;
        feedback.info("Finished transcription");
        text
    } else {
        feedback.info("Using custom reference text...");
        ref_text.to_string()
    };

    Ok(PreparedReference { audio_path, audio, text: terminate_sentence(text.trim()) })
}

/// Make sure the reference transcript ends like a finished sentence so the
/// engine does not run it into the generated text.
pub fn terminate_sentence(text: &str) -> String {
    if text.ends_with(". ") || text.ends_with('。') {
        text.to_string()
    } else if text.ends_with('.') {
        format!("{} ", text)
    } else {
        format!("{}. ", text)
    }
}

/// Largest batch, in UTF-8 bytes, that keeps reference plus batch audio
/// under [`MAX_CONTEXT_SECS`] at the reference clip's speaking rate.
pub fn max_batch_bytes(ref_text: &str, ref_secs: f32) -> usize {
    if ref_secs <= 0.0 {
        return MIN_BATCH_BYTES;
    }
    let bytes_per_sec = ref_text.len() as f32 / ref_secs;
    let budget = bytes_per_sec * (MAX_CONTEXT_SECS - ref_secs);
    (budget.max(0.0) as usize).max(MIN_BATCH_BYTES)
}

fn is_fullwidth_break(c: char) -> bool {
    matches!(c, '；' | '：' | '，' | '。' | '！' | '？')
}

/// Split after sentence and clause punctuation.  ASCII marks only count
/// when followed by whitespace, which is dropped; full-width marks split
/// immediately.
fn split_clauses(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        if is_fullwidth_break(c) {
            pieces.push(&text[start..end]);
            start = end;
        } else if matches!(c, ';' | ':' | ',' | '.' | '!' | '?')
            && chars.peek().is_some_and(|&(_, n)| n.is_whitespace())
        {
            pieces.push(&text[start..end]);
            while let Some(&(j, n)) = chars.peek() {
                if !n.is_whitespace() {
                    break;
                }
                chars.next();
                start = j + n.len_utf8();
            }
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// Greedily pack clauses into batches of at most `max_bytes` UTF-8 bytes.
/// A single clause longer than the limit becomes its own batch.
pub fn chunk_text(text: &str, max_bytes: usize) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for clause in split_clauses(text) {
        if clause.is_empty() {
            continue;
        }
        if !current.is_empty() && current.len() + clause.len() > max_bytes {
            batches.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(clause);
        // ASCII-ending clauses were separated by whitespace.
        if clause.chars().last().is_some_and(|c| c.is_ascii()) {
            current.push(' ');
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        batches.push(tail.to_string());
    }
    batches
}

/// Synthesize `text` batch by batch and join the results.
pub fn synthesize_text(
    model: &dyn SpeechModel,
    reference: &PreparedReference,
    text: &str,
    params: &GenerationParams,
) -> Result<(Waveform, Spectrogram)> {
    let max_bytes = max_batch_bytes(&reference.text, reference.audio.duration_secs());
    let batches = chunk_text(text.trim(), max_bytes);
    tracing::debug!("Generating {} batch(es), at most {} bytes each", batches.len(), max_bytes);

    let mut waves = Vec::with_capacity(batches.len());
    let mut spec = Spectrogram::default();
    for (i, batch) in batches.iter().enumerate() {
        tracing::debug!("Batch {}/{}: {:?}", i + 1, batches.len(), batch);
        let out = model
            .synthesize(&SynthesisRequest {
                reference: reference.as_reference(),
                text: batch,
                nfe_step: params.nfe_step,
                speed: params.speed,
            })
            .with_context(|| format!("Synthesis failed on batch {}", i + 1))?;
        spec.extend(&out.spectrogram);
        waves.push(out.waveform);
    }
    Ok((audio::crossfade_concat(&waves, params.cross_fade), spec))
}

/// Silence removal round-trips through a scratch WAV, which stays behind.
fn strip_silence_via_file(wave: &Waveform) -> Result<Waveform> {
    let path = audio::kept_temp_file(".wav")?;
    audio::write_wav(wave, &path)?;
    audio::remove_silence_in_file(&path)?;
    audio::read_wav(&path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
