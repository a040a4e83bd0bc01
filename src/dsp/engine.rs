//! Sample-stepping interpreter.
//!
//! [`step`] advances every node of a compiled rack by exactly one sample
//! against one voice's [`RegisterFile`]. Nodes run in array order with no
//! dependency sorting: a node that reads a *later* node's output sees that
//! node's value from the previous sample, which is how feedback loops work.
//!
//! Called from the audio thread. Nothing here allocates outside the slow
//! paths inside [`RegisterFile::reconcile`].

use crate::rack::{
    Biquad, Builtin, Delay, EffectKind, EffectRack, Envelope, Maths, Noise, Oscillator, SIGNAL_EPSILON,
    Switch,
};

use super::delay::samples_for;
use super::envelope::{self, Adsr, Stage};
use super::filter::{self, Coefficients};
use super::oscillator::advance_phase;
use super::registers::RegisterFile;

/// Compute one sample.
///
/// Returns the output register of the last evaluated node: the final node,
/// or the node at `rack.debug_cursor` when set. An empty rack outputs 0.
///
/// # Panics
///
/// If `rack` has never been compiled.
pub fn step(
    rack: &EffectRack,
    file: &mut RegisterFile,
    key_frequency: f32,
    signal: f32,
    sample_rate: f32,
    freshly_triggered: bool,
) -> f32 {
    assert!(rack.is_compiled(), "effect rack stepped before it was compiled");

    file.reconcile(rack.template(), sample_rate, freshly_triggered);

    let dt = 1.0 / sample_rate;
    file.write(Builtin::KeyFrequency.reg(), key_frequency);
    file.write(Builtin::Signal.reg(), signal);
    file.write(Builtin::SampleDt.reg(), dt);
    file.write(Builtin::SignalRaw.reg(), if signal.abs() > SIGNAL_EPSILON { 1.0 } else { 0.0 });

    let Some(end) = rack.effects.len().checked_sub(1) else {
        return 0.0;
    };
    let last = rack.debug_cursor.map_or(end, |cursor| cursor.min(end));

    for effect in &rack.effects[..=last] {
        if !effect.enabled {
            continue;
        }

        let value = match &effect.value {
            EffectKind::Oscillator(o) => oscillator(o, file, dt),
            EffectKind::Envelope(e) => envelope(e, file, dt),
            EffectKind::Maths(m) => maths(m, file),
            EffectKind::Switch(s) => switch(s, file),
            EffectKind::Noise(n) => noise(n, file),
            EffectKind::Delay(d) => delay(d, file, sample_rate),
            EffectKind::Biquad(b) => biquad(b, file),
        };

        file.write(effect.dst, value);
    }

    file.read(rack.effects[last].dst)
}

// ── Node Kernels ────────────────────────────────────────────

/// Silent oscillators (amplitude exactly 0) keep their phase frozen.
#[inline]
fn oscillator(o: &Oscillator, re: &mut RegisterFile, dt: f32) -> f32 {
    let amplitude = re.read(o.amplitude.reg());
    if amplitude == 0.0 {
        return 0.0;
    }

    let t = re.read(o.t);
    let wave = o.waveform.sample(t + re.read(o.phase.reg()));
    let increment = dt * re.read(o.frequency.reg()) * re.read(o.frequency_mult.reg());
    re.write(o.t, advance_phase(t, increment));

    wave * amplitude + re.read(o.offset.reg())
}

#[inline]
fn envelope(e: &Envelope, re: &mut RegisterFile, dt: f32) -> f32 {
    let params = Adsr {
        attack: re.read(e.attack.reg()),
        decay: re.read(e.decay.reg()),
        sustain: re.read(e.sustain.reg()),
        release: re.read(e.release.reg()),
    };
    let stage = Stage::from_register(re.read(e.stage));
    let gate = re.read(e.signal.reg());

    let (stage, level) = envelope::advance(stage, re.read(e.value), gate, &params, dt);
    re.write(e.stage, stage.as_register());
    re.write(e.value, level);

    level * re.read(e.to_modulate.reg())
}

#[inline]
fn maths(m: &Maths, re: &RegisterFile) -> f32 {
    m.terms
        .iter()
        .map(|term| term.coefficients.iter().map(|c| re.read(c.reg())).product::<f32>())
        .sum()
}

#[inline]
fn switch(s: &Switch, re: &RegisterFile) -> f32 {
    s.conditions
        .iter()
        .find(|c| c.operator.test(re.read(c.a.reg()), re.read(c.b.reg())))
        .map_or_else(|| re.read(s.default.reg()), |c| re.read(c.then.reg()))
}

/// Full-scale regardless of the amplitude's magnitude; see [`Noise`].
#[inline]
fn noise(n: &Noise, re: &mut RegisterFile) -> f32 {
    if re.read(n.amplitude.reg()).abs() > 0.0 { re.noise() } else { 0.0 }
}

#[inline]
fn delay(d: &Delay, re: &mut RegisterFile, sample_rate: f32) -> f32 {
    let input = re.read(d.signal.reg());
    let length = samples_for(re.read(d.seconds.reg()), sample_rate);
    let cursor = re.read(d.cursor) as usize;

    let (out, next) = re.buffer_mut(d.buffer).tick(input, cursor, length);
    re.write(d.cursor, next as f32);
    out
}

#[inline]
fn biquad(b: &Biquad, re: &mut RegisterFile) -> f32 {
    let c = Coefficients {
        a1: re.read(b.a1.reg()),
        a2: re.read(b.a2.reg()),
        b0: re.read(b.b0.reg()),
        b1: re.read(b.b1.reg()),
        b2: re.read(b.b2.reg()),
    };
    let (out, z1, z2) = filter::tick(re.read(b.signal.reg()), &c, re.read(b.z1), re.read(b.z2));
    re.write(b.z1, z1);
    re.write(b.z2, z2);
    out
}
