pub mod codec;
pub mod compiler;
pub mod dsp;
pub mod error;
pub mod rack;

use crate::dsp::renderer::RenderConfig;
use crate::dsp::voice::Voice;
use crate::rack::EffectRack;
use wasm_bindgen::prelude::*;

pub use crate::codec::{deserialize, load, serialize};
pub use crate::compiler::compile;
pub use crate::dsp::engine::step;
pub use crate::dsp::registers::RegisterFile;
pub use crate::error::RackError;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

fn render_config(config: JsValue) -> Result<RenderConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(RenderConfig::default());
    }
    serde_wasm_bindgen::from_value(config).map_err(to_js)
}

/// WASM-exposed: return the effect-rack-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: decode, compile and re-encode a rack. Applies pending
/// deletions and demotes dangling references.
#[wasm_bindgen]
pub fn normalize_rack(json: &str) -> Result<String, JsValue> {
    let mut rack = codec::deserialize(json).map_err(to_js)?;
    codec::serialize(&mut rack).map_err(to_js)
}

/// WASM-exposed: node IDs and register counts of a compiled rack.
#[wasm_bindgen]
pub fn rack_info(json: &str) -> Result<JsValue, JsValue> {
    let rack = codec::load(json).map_err(to_js)?;
    serde_wasm_bindgen::to_value(&rack.info()).map_err(to_js)
}

/// WASM-exposed: render one note through a rack to mono f32 samples.
#[wasm_bindgen]
pub fn render_rack_samples(json: &str, config: JsValue) -> Result<Vec<f32>, JsValue> {
    let rack = codec::load(json).map_err(to_js)?;
    Ok(dsp::renderer::render(&rack, &render_config(config)?))
}

/// WASM-exposed: render one note through a rack to a WAV byte array.
#[wasm_bindgen]
pub fn render_rack_wav(json: &str, config: JsValue) -> Result<Vec<u8>, JsValue> {
    let rack = codec::load(json).map_err(to_js)?;
    Ok(dsp::renderer::render_wav(&rack, &render_config(config)?))
}

/// WASM-exposed: a rack plus one voice, for AudioWorklet playback.
///
/// `process` fills a block in place and never allocates unless the sample
/// rate changes or a new rack was loaded.
#[wasm_bindgen]
pub struct RackVoice {
    rack: EffectRack,
    voice: Voice,
}

#[wasm_bindgen]
impl RackVoice {
    #[wasm_bindgen(constructor)]
    pub fn new(json: &str) -> Result<RackVoice, JsValue> {
        Ok(RackVoice {
            rack: codec::load(json).map_err(to_js)?,
            voice: Voice::new(),
        })
    }

    /// Swap in an edited rack. Voice state carries over where the layout allows.
    pub fn set_rack(&mut self, json: &str) -> Result<(), JsValue> {
        self.rack = codec::load(json).map_err(to_js)?;
        Ok(())
    }

    pub fn note_on(&mut self, frequency: f32) {
        self.voice.note_on(frequency);
    }

    pub fn note_off(&mut self) {
        self.voice.note_off();
    }

    pub fn process(&mut self, output: &mut [f32], sample_rate: f32) {
        self.voice.process(&self.rack, sample_rate, output);
    }
}
