//! Voice: one sounding note driving an effect rack.

use crate::rack::EffectRack;

use super::engine;
use super::registers::RegisterFile;

/// A single voice: its own register file plus the key and gate it was
/// started with. Any number of voices can share one rack.
#[derive(Debug, Clone)]
pub struct Voice {
    registers: RegisterFile,
    /// Key frequency in Hz.
    pub frequency: f32,
    /// Gate signal; 0 when released.
    pub signal: f32,
    /// Set by `note_on`, consumed by the next sample.
    retrigger: bool,
}

impl Voice {
    pub fn new() -> Self {
        Self::with_registers(RegisterFile::new())
    }

    /// A voice with a fixed noise seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_registers(RegisterFile::with_seed(seed))
    }

    fn with_registers(registers: RegisterFile) -> Self {
        Voice {
            registers,
            frequency: 440.0,
            signal: 0.0,
            retrigger: false,
        }
    }

    /// Start (or restart) a note. All voice state is reset on the next sample.
    pub fn note_on(&mut self, frequency: f32) {
        self.frequency = frequency;
        self.signal = 1.0;
        self.retrigger = true;
    }

    /// Release the note. Envelopes fall toward zero from here.
    pub fn note_off(&mut self) {
        self.signal = 0.0;
    }

    pub fn is_held(&self) -> bool {
        self.signal > 0.0
    }

    /// Generate the next sample.
    #[inline]
    pub fn next_sample(&mut self, rack: &EffectRack, sample_rate: f32) -> f32 {
        let fresh = std::mem::take(&mut self.retrigger);
        engine::step(rack, &mut self.registers, self.frequency, self.signal, sample_rate, fresh)
    }

    /// Fill `out` with consecutive samples.
    pub fn process(&mut self, rack: &EffectRack, sample_rate: f32, out: &mut [f32]) {
        for s in out.iter_mut() {
            *s = self.next_sample(rack, sample_rate);
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}
