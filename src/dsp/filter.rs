//! Biquad filter: direct form 2 tick plus Audio EQ Cookbook designs.
//!
//! A biquad node reads its five coefficients from registers every sample,
//! so anything (an LFO, an envelope) can modulate them. The designs below
//! produce `a0`-normalized constants for editors that want a classic
//! lowpass/highpass/bandpass/notch without working out the math.

use std::f32::consts::PI;

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub a1: f32,
    pub a2: f32,
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
}

/// Filter response for [`Coefficients::design`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

impl Coefficients {
    /// Passes the input through unchanged.
    pub const IDENTITY: Coefficients = Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 };

    /// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
    pub fn design(filter_type: FilterType, frequency: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Coefficients {
            a1: a1 / a0,
            a2: a2 / a0,
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
        }
    }
}

/// One direct form 2 step. Returns `(output, z1, z2)` for the next sample.
#[inline]
pub fn tick(signal: f32, c: &Coefficients, z1: f32, z2: f32) -> (f32, f32, f32) {
    let w = signal - c.a1 * z1 - c.a2 * z2;
    let out = c.b0 * w + c.b1 * z1 + c.b2 * z2;
    (out, w, z1)
}
