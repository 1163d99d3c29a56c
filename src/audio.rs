//! WAV I/O and the waveform post-processing the dispatcher needs:
//! cross-fade joining, silence removal and reference clipping.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::engine::Waveform;

/// Silence threshold for silence removal, in dBFS.
pub const SILENCE_THRESH_DB: f32 = -50.0;

/// Silences at least this long are collapsed.
pub const MIN_SILENCE_MS: u32 = 1_000;

/// Padding kept on each side of speech when collapsing a silence.
pub const KEEP_SILENCE_MS: u32 = 500;

/// Reference clips are cut to at most this length.
pub const MAX_REFERENCE_SECS: f32 = 12.0;

/// Analysis frame for silence detection.
const FRAME_MS: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// WAV I/O
// ─────────────────────────────────────────────────────────────────────────────

/// Write `wave` to a 16-bit PCM mono WAV file.
///
/// 16-bit PCM rather than 32-bit float: browsers and most players decode it
/// without surprises.
pub fn write_wav(wave: &Waveform, output_path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output_path, spec)
        .with_context(|| format!("Cannot create WAV: {}", output_path.display()))?;
    for &s in &wave.samples {
        let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(s16).context("WAV write error")?;
    }
    writer.finalize().context("WAV finalise error")?;
    tracing::debug!(
        "Saved {} samples ({:.2} s) to {}",
        wave.samples.len(),
        wave.duration_secs(),
        output_path.display()
    );
    Ok(())
}

/// Encode `wave` as an in-memory 16-bit PCM WAV file.
pub fn wav_bytes(wave: &Waveform) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("WAV header error")?;
        for &s in &wave.samples {
            let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(s16).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalise error")?;
    }
    Ok(cursor.into_inner())
}

/// Read a WAV file, mixing multi-channel audio down to mono.
pub fn read_wav(path: &Path) -> Result<Waveform> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Cannot open WAV: {}", path.display()))?;
    decode(reader).with_context(|| format!("Cannot decode WAV: {}", path.display()))
}

/// Decode WAV bytes (e.g. a worker response), mixing down to mono.
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<Waveform> {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).context("Invalid WAV data")?;
    decode(reader)
}

fn decode<R: std::io::Read>(reader: hound::WavReader<R>) -> Result<Waveform> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("WAV sample error")?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                bail!("Unsupported WAV bit depth {}", spec.bits_per_sample);
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("WAV sample error")?
        }
    };
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    Ok(Waveform::new(samples, spec.sample_rate))
}

// ─────────────────────────────────────────────────────────────────────────────
// Scratch files
// ─────────────────────────────────────────────────────────────────────────────

/// Create an empty file in the temp directory that outlives this process.
///
/// The caller owns its lifecycle; nothing here deletes it.
pub fn kept_temp_file(suffix: &str) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("f5studio-")
        .suffix(suffix)
        .tempfile()
        .context("Cannot create scratch file")?;
    file.into_temp_path().keep().context("Cannot keep scratch file")
}

// ─────────────────────────────────────────────────────────────────────────────
// Cross-fade
// ─────────────────────────────────────────────────────────────────────────────

/// Join waveforms in order, overlapping neighbours by `cross_fade_secs`
/// with a linear fade.  The overlap is clamped to the shorter neighbour;
/// `0` means plain concatenation.
pub fn crossfade_concat(parts: &[Waveform], cross_fade_secs: f32) -> Waveform {
    let Some(first) = parts.first() else {
        return Waveform::default();
    };
    let sample_rate = first.sample_rate;
    let mut out = first.samples.clone();

    for part in &parts[1..] {
        let fade = (cross_fade_secs.max(0.0) * sample_rate as f32) as usize;
        let fade = fade.min(out.len()).min(part.samples.len());
        if fade == 0 {
            out.extend_from_slice(&part.samples);
            continue;
        }
        let start = out.len() - fade;
        for i in 0..fade {
            let t = if fade == 1 { 1.0 } else { i as f32 / (fade - 1) as f32 };
            out[start + i] = out[start + i] * (1.0 - t) + part.samples[i] * t;
        }
        out.extend_from_slice(&part.samples[fade..]);
    }

    Waveform::new(out, sample_rate)
}

// ─────────────────────────────────────────────────────────────────────────────
// Silence
// ─────────────────────────────────────────────────────────────────────────────

fn ms_to_frames(ms: u32) -> usize {
    (ms / FRAME_MS) as usize
}

/// Per-frame "is silent" flags.
fn silent_frames(wave: &Waveform, thresh_db: f32) -> (usize, Vec<bool>) {
    let frame_len = ((wave.sample_rate as usize * FRAME_MS as usize) / 1000).max(1);
    let flags = wave
        .samples
        .chunks(frame_len)
        .map(|frame| {
            let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
            let db = if rms > 0.0 { 20.0 * rms.log10() } else { f32::NEG_INFINITY };
            db < thresh_db
        })
        .collect();
    (frame_len, flags)
}

/// Collapse every silence of at least [`MIN_SILENCE_MS`] down to
/// [`KEEP_SILENCE_MS`] of padding next to the surrounding speech.
///
/// Audio with no speech at all is returned unchanged.
pub fn remove_silence(wave: &Waveform) -> Waveform {
    let (frame_len, silent) = silent_frames(wave, SILENCE_THRESH_DB);
    if silent.iter().all(|&s| s) {
        return wave.clone();
    }
    let min_run = ms_to_frames(MIN_SILENCE_MS);
    let keep = ms_to_frames(KEEP_SILENCE_MS);

    let mut keep_frame = vec![true; silent.len()];
    let mut i = 0;
    while i < silent.len() {
        if !silent[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < silent.len() && silent[i] {
            i += 1;
        }
        let end = i;
        if end - start < min_run {
            continue;
        }
        // Leading/trailing silences only keep padding on the speech side.
        let lead = if start == 0 { 0 } else { keep };
        let tail = if end == silent.len() { 0 } else { keep };
        let drop_from = start + lead.min(end - start);
        let drop_to = end.saturating_sub(tail).max(drop_from);
        for flag in &mut keep_frame[drop_from..drop_to] {
            *flag = false;
        }
    }

    let samples = wave
        .samples
        .chunks(frame_len)
        .zip(&keep_frame)
        .filter(|(_, keep)| **keep)
        .flat_map(|(frame, _)| frame.iter().copied())
        .collect();
    Waveform::new(samples, wave.sample_rate)
}

/// Silence removal on a file, in place: read, collapse silences, rewrite.
pub fn remove_silence_in_file(path: &Path) -> Result<()> {
    let wave = read_wav(path)?;
    write_wav(&remove_silence(&wave), path)
}

/// Cut a reference clip to at most `max_secs`.
///
/// Prefers ending at the last silence of at least one second before the
/// limit so the clip does not stop mid-word; otherwise hard-cuts.
pub fn clip_reference(wave: &Waveform, max_secs: f32) -> Waveform {
    if wave.duration_secs() <= max_secs {
        return wave.clone();
    }
    let limit = (max_secs * wave.sample_rate as f32) as usize;
    let (frame_len, silent) = silent_frames(wave, SILENCE_THRESH_DB);
    let min_run = ms_to_frames(MIN_SILENCE_MS);
    let limit_frame = limit / frame_len;

    let mut cut = None;
    let mut run = 0;
    for (idx, &s) in silent.iter().enumerate().take(limit_frame) {
        run = if s { run + 1 } else { 0 };
        if run >= min_run {
            // Keep a little of the silence after the last word.
            let start = idx + 1 - run;
            cut = Some(((start + ms_to_frames(KEEP_SILENCE_MS).min(run)) * frame_len).min(limit));
        }
    }
    let cut = cut.filter(|&c| c > 0).unwrap_or(limit);
    Waveform::new(wave.samples[..cut].to_vec(), wave.sample_rate)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
