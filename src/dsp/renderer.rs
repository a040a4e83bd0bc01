//! Offline renderer: plays one note through a rack into a buffer or WAV.

use serde::Deserialize;

use crate::rack::EffectRack;

use super::voice::Voice;

/// Settings for an offline preview render.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    pub sample_rate: u32,
    /// Key frequency in Hz.
    pub frequency: f32,
    /// How long the key is held.
    pub gate_seconds: f32,
    /// How long to keep rendering after release.
    pub tail_seconds: f32,
    /// Noise seed, so previews are reproducible.
    pub seed: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            sample_rate: 44100,
            frequency: 440.0,
            gate_seconds: 1.0,
            tail_seconds: 0.5,
            seed: 0,
        }
    }
}

/// Render a single held-then-released note. `rack` must be compiled.
pub fn render(rack: &EffectRack, config: &RenderConfig) -> Vec<f32> {
    let sr = config.sample_rate as f32;
    let gate = (config.gate_seconds.max(0.0) * sr).round() as usize;
    let total = gate + (config.tail_seconds.max(0.0) * sr).round() as usize;

    let mut voice = Voice::with_seed(config.seed);
    voice.note_on(config.frequency);

    let mut out = Vec::with_capacity(total);
    for i in 0..total {
        if i == gate {
            voice.note_off();
        }
        out.push(voice.next_sample(rack, sr));
    }
    out
}

/// Render to a 16-bit mono WAV file as bytes.
pub fn render_wav(rack: &EffectRack, config: &RenderConfig) -> Vec<u8> {
    encode_wav(&render(rack, config), config.sample_rate)
}

const WAV_HEADER_LEN: usize = 44;

/// Mono 16-bit PCM in a canonical RIFF container. Samples are clipped to [-1, 1].
fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    const BYTES_PER_SAMPLE: u16 = 2;
    let data_len = (samples.len() * BYTES_PER_SAMPLE as usize) as u32;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    chunk_header(&mut out, b"RIFF", WAV_HEADER_LEN as u32 - 8 + data_len);
    out.extend_from_slice(b"WAVE");

    chunk_header(&mut out, b"fmt ", 16);
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * BYTES_PER_SAMPLE as u32).to_le_bytes());
    out.extend_from_slice(&BYTES_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(&(BYTES_PER_SAMPLE * 8).to_le_bytes());

    chunk_header(&mut out, b"data", data_len);
    out.extend(samples.iter().flat_map(|s| {
        let pcm = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        pcm.to_le_bytes()
    }));

    out
}

fn chunk_header(out: &mut Vec<u8>, tag: &[u8; 4], len: u32) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&len.to_le_bytes());
}
