//! Turn-based waveforms.
//!
//! Phase is measured in turns: `0..1` is one full cycle. These are naive
//! (non-band-limited) shapes; the rack runs them at audio rate and relies on
//! downstream filtering where aliasing matters.

use std::f32::consts::TAU;

use crate::rack::Waveform;

#[inline]
pub fn sine(t: f32) -> f32 {
    (TAU * t).sin()
}

/// +1 for the first half of each turn, -1 for the second.
#[inline]
pub fn square(t: f32) -> f32 {
    if t.rem_euclid(1.0) < 0.5 { 1.0 } else { -1.0 }
}

/// Rises from -1 to +1 over each turn.
#[inline]
pub fn sawtooth(t: f32) -> f32 {
    2.0 * t.rem_euclid(1.0) - 1.0
}

/// -1 at the start of a turn, +1 halfway, symmetric in `t`.
#[inline]
pub fn triangle(t: f32) -> f32 {
    let t = t.abs() % 1.0;
    let rise = if t > 0.5 { 2.0 - 2.0 * t } else { 2.0 * t };
    2.0 * (rise - 0.5)
}

impl Waveform {
    /// Evaluate this waveform at `t` turns.
    #[inline]
    pub fn sample(self, t: f32) -> f32 {
        match self {
            Waveform::Sine => sine(t),
            Waveform::Square => square(t),
            Waveform::Sawtooth => sawtooth(t),
            Waveform::Triangle => triangle(t),
            Waveform::ReverseSawtooth => -sawtooth(t),
        }
    }
}

/// Advance a phase accumulator, keeping it in `[0, 1)` so precision does
/// not degrade over long notes.
#[inline]
pub fn advance_phase(t: f32, increment: f32) -> f32 {
    let next = (t + increment).rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
    if next >= 1.0 { 0.0 } else { next }
}
