//! Register-driven ADSR envelope.
//!
//! The envelope's stage and level are stored in two persisted registers, so
//! the logic here is a pure step function over that state.

/// Envelope stages. Stored in a register as 0, 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Attack,
    Decay,
    Sustain,
}

impl Stage {
    pub fn from_register(v: f32) -> Self {
        if v >= 2.0 {
            Stage::Sustain
        } else if v >= 1.0 {
            Stage::Decay
        } else {
            Stage::Attack
        }
    }

    pub fn as_register(self) -> f32 {
        match self {
            Stage::Attack => 0.0,
            Stage::Decay => 1.0,
            Stage::Sustain => 2.0,
        }
    }
}

/// Timing parameters, read from registers each sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    /// Seconds from 0 to 1.
    pub attack: f32,
    /// Seconds from 1 to the sustain level.
    pub decay: f32,
    /// Sustain level [0, 1].
    pub sustain: f32,
    /// Seconds from 1 to 0.
    pub release: f32,
}

/// Move `a` toward `b` by at most `max_delta`.
#[inline]
pub fn move_towards(a: f32, b: f32, max_delta: f32) -> f32 {
    if (a - b).abs() < max_delta {
        b
    } else if a > b {
        a - max_delta
    } else {
        a + max_delta
    }
}

/// Advance the envelope by one sample of length `dt`.
///
/// While `gate > 0` the level climbs to 1, falls to the sustain level and
/// holds there. Once the gate drops, the level falls toward 0 and the stage
/// returns to attack, so pressing again mid-release attacks from the
/// current level instead of waiting for the release to finish.
///
/// Zero-length stages complete in a single sample.
#[inline]
pub fn advance(stage: Stage, level: f32, gate: f32, p: &Adsr, dt: f32) -> (Stage, f32) {
    let mut stage = stage;
    let mut level = level;

    if gate > 0.0 {
        match stage {
            Stage::Attack => {
                level += dt / p.attack;
                if !(level < 1.0) {
                    level = 1.0;
                    stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                level -= (1.0 - p.sustain) * dt / p.decay;
                if !(level > p.sustain) {
                    level = p.sustain;
                    stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                // Only moves if the sustain level changes while held.
                level = move_towards(level, p.sustain, dt / p.decay);
            }
        }
    } else if level > 0.0 {
        level -= dt / p.release;
        if !(level > 0.0) {
            level = 0.0;
        }
        stage = Stage::Attack;
    }

    (stage, level)
}
