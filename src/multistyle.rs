//! Multi-style generation: one script, several reference voices.
//!
//! Speech types are edited on a [`SpeechTypeBoard`], a fixed window of
//! [`MAX_SPEECH_TYPES`] rows of which row 0 (`Regular`) is always shown.
//! A generation request snapshots the board into [`SpeechTypes`], speaks
//! every script segment in its style and concatenates the results.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::engine::{Transcriber, Waveform};
use crate::error::StudioError;
use crate::feedback::Feedback;
use crate::infer::{self, GenerationParams, TtsRequest};
use crate::model::ModelRegistry;
use crate::normalize::TextNormalizer;
use crate::script::{self, DEFAULT_STYLE};

pub const MAX_SPEECH_TYPES: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Board
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechTypeRow {
    pub name: String,
    pub audio: Option<PathBuf>,
    pub ref_text: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechTypeBoard {
    rows: Vec<SpeechTypeRow>,
}

impl Default for SpeechTypeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechTypeBoard {
    pub fn new() -> Self {
        let mut rows = vec![SpeechTypeRow::default(); MAX_SPEECH_TYPES];
        rows[0] = SpeechTypeRow { name: DEFAULT_STYLE.to_string(), visible: true, ..Default::default() };
        Self { rows }
    }

    pub fn rows(&self) -> &[SpeechTypeRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&SpeechTypeRow> {
        self.rows.get(index)
    }

    pub fn visible_count(&self) -> usize {
        self.rows.iter().filter(|r| r.visible).count()
    }

    /// Reveal the first hidden row and return its index.
    pub fn add(&mut self, feedback: &mut Feedback) -> Option<usize> {
        match self.rows.iter().position(|r| !r.visible) {
            Some(index) => {
                self.rows[index].visible = true;
                Some(index)
            }
            None => {
                feedback.warn("Reached the maximum number of speech types.");
                None
            }
        }
    }

    /// Hide row `index` and clear its fields.  Row 0 cannot be deleted.
    pub fn delete(&mut self, index: usize) -> Result<(), StudioError> {
        if index == 0 || index >= self.rows.len() {
            return Err(StudioError::BadRow(index));
        }
        self.rows[index] = SpeechTypeRow::default();
        Ok(())
    }

    /// Replace the fields of a visible row.
    pub fn update(
        &mut self,
        index: usize,
        name: &str,
        audio: Option<PathBuf>,
        ref_text: &str,
    ) -> Result<(), StudioError> {
        let row = self
            .rows
            .get_mut(index)
            .filter(|r| r.visible)
            .ok_or(StudioError::BadRow(index))?;
        row.name = name.trim().to_string();
        row.audio = audio;
        row.ref_text = ref_text.to_string();
        Ok(())
    }

    /// Append row `index`'s label to `script`.
    pub fn insert_label(&self, index: usize, script: &str) -> Result<String, StudioError> {
        let row = self.rows.get(index).ok_or(StudioError::BadRow(index))?;
        Ok(script::insert_label(script, &row.name))
    }

    /// Non-empty row names.
    pub fn names(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.name.as_str()).filter(|n| !n.is_empty()).collect()
    }

    /// False when the script speaks in a style no row defines.
    pub fn can_generate(&self, script: &str) -> bool {
        script::missing_styles(script, self.names()).is_empty()
    }

    pub fn speech_types(&self) -> SpeechTypes {
        SpeechTypes::from_rows(&self.rows)
    }

    /// Write the transcripts from a finished request back to the rows.
    pub fn apply_ref_texts(&mut self, ref_texts: &[String]) {
        for (row, text) in self.rows.iter_mut().zip(ref_texts) {
            row.ref_text.clone_from(text);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Speech types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechType {
    pub audio: Option<PathBuf>,
    pub ref_text: String,
}

/// Speech types keyed by name, in first-insertion order.
///
/// Built from rows: a row with both a name and audio is keyed by its name
/// (a later row with the same name overwrites the entry in place); any
/// other row gets a placeholder key `@<row index>@` and no audio.
#[derive(Debug, Clone, Default)]
pub struct SpeechTypes {
    entries: Vec<(String, SpeechType)>,
    row_keys: Vec<String>,
}

impl SpeechTypes {
    pub fn from_rows(rows: &[SpeechTypeRow]) -> Self {
        let mut types = Self::default();
        for (index, row) in rows.iter().enumerate() {
            let key = match &row.audio {
                Some(audio) if !row.name.is_empty() => {
                    types.insert(&row.name, SpeechType { audio: Some(audio.clone()), ref_text: row.ref_text.clone() });
                    row.name.clone()
                }
                _ => {
                    let key = placeholder_key(index);
                    types.insert(&key, SpeechType { audio: None, ref_text: row.ref_text.clone() });
                    key
                }
            };
            types.row_keys.push(key);
        }
        types
    }

    pub fn insert(&mut self, name: &str, speech_type: SpeechType) {
        match self.get_mut(name) {
            Some(existing) => *existing = speech_type,
            None => self.entries.push((name.to_string(), speech_type)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SpeechType> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SpeechType> {
        self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current transcript for every source row, in row order.
    pub fn row_ref_texts(&self) -> Vec<String> {
        self.row_keys
            .iter()
            .map(|key| self.get(key).map(|t| t.ref_text.clone()).unwrap_or_default())
            .collect()
    }
}

fn placeholder_key(index: usize) -> String {
    format!("@{}@", index)
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Speak `script` segment by segment and concatenate the audio.
///
/// Transcripts produced along the way are stored back into `types`, so a
/// style is transcribed at most once per request.  Returns `None` (with a
/// warning) when a resolved style has no reference audio or nothing was
/// generated.
pub fn generate(
    models: &mut ModelRegistry,
    transcriber: &dyn Transcriber,
    script: &str,
    types: &mut SpeechTypes,
    remove_silence: bool,
    normalizer: &dyn TextNormalizer,
    feedback: &mut Feedback,
) -> Result<Option<Waveform>> {
    let params = GenerationParams { remove_silence, cross_fade: 0.0, ..Default::default() };
    // Resolve every segment first so a missing clip aborts before any
    // synthesis runs.
    let mut plan = Vec::new();
    for segment in script::parse_script(script) {
        let style = if types.contains(&segment.style) {
            segment.style
        } else {
            feedback.warn(format!(
                "Type {} is not available, using {} as default.",
                segment.style, DEFAULT_STYLE
            ));
            DEFAULT_STYLE.to_string()
        };
        let Some(SpeechType { audio: Some(audio), .. }) = types.get(&style) else {
            feedback.warn(format!("Please provide reference audio for type {}.", style));
            return Ok(None);
        };
        plan.push((style.clone(), audio.clone(), segment.text));
    }

    let mut parts: Vec<Waveform> = Vec::new();
    for (style, audio, text) in plan {
        // Earlier segments may have filled in this style's transcript.
        let ref_text = types.get(&style).map(|t| t.ref_text.clone()).unwrap_or_default();
        let text = normalizer.normalize(&text);
        let request = TtsRequest { ref_audio: Some(audio.as_path()), ref_text: &ref_text, gen_text: &text, params };
        let inference = infer::infer(models, transcriber, &request, feedback)?;
        if let Some(speech_type) = types.get_mut(&style) {
            speech_type.ref_text = inference.ref_text;
        }
        if let Some(generated) = inference.output {
            parts.push(generated.waveform);
        }
    }

    if parts.is_empty() {
        feedback.warn("No audio generated.");
        return Ok(None);
    }
    let sample_rate = parts[0].sample_rate;
    let samples = parts.into_iter().flat_map(|w| w.samples).collect();
    Ok(Some(Waveform::new(samples, sample_rate)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
