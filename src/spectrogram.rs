//! Spectrogram rendering.
//!
//! Frames run left to right, mel bins bottom to top.  Values are min-max
//! scaled and mapped through a viridis-style colour ramp.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::audio::kept_temp_file;
use crate::engine::Spectrogram;

/// Colour stops sampled from viridis (dark purple → yellow).
const RAMP: [[f32; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

fn colour(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0) * (RAMP.len() - 1) as f32;
    let lo = (t.floor() as usize).min(RAMP.len() - 2);
    let frac = t - lo as f32;
    let mut rgb = [0u8; 3];
    for (c, out) in rgb.iter_mut().enumerate() {
        *out = (RAMP[lo][c] + (RAMP[lo + 1][c] - RAMP[lo][c]) * frac).round() as u8;
    }
    rgb
}

/// RGB pixel rows, top row first.  An empty spectrogram is a single dark
/// pixel.
fn to_pixels(spec: &Spectrogram) -> (u32, u32, Vec<u8>) {
    let frames = spec.frames();
    if frames == 0 {
        return (1, 1, colour(0.0).to_vec());
    }
    let mels = spec.n_mels;
    let values = &spec.data[..frames * mels];

    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if max > min { max - min } else { 1.0 };

    let mut pixels = Vec::with_capacity(frames * mels * 3);
    for row in 0..mels {
        let mel = mels - 1 - row;
        for frame in 0..frames {
            let v = values[frame * mels + mel];
            let t = if v.is_finite() { (v - min) / range } else { 0.0 };
            pixels.extend_from_slice(&colour(t));
        }
    }
    (frames as u32, mels as u32, pixels)
}

/// Write `spec` as a PNG image at `path`.
pub fn save_spectrogram(spec: &Spectrogram, path: &Path) -> Result<()> {
    let (width, height, pixels) = to_pixels(spec);
    let file = File::create(path)
        .with_context(|| format!("Cannot create spectrogram image: {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("PNG header error")?;
    writer.write_image_data(&pixels).context("PNG write error")?;
    writer.finish().context("PNG finalise error")
}

/// Render `spec` to a kept PNG in the temp directory and return its path.
pub fn render_to_temp(spec: &Spectrogram) -> Result<PathBuf> {
    let path = kept_temp_file(".png")?;
    save_spectrogram(spec, &path)?;
    Ok(path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
