//! Delay line: a fixed-capacity ring buffer stepped one sample at a time.
//!
//! The write cursor lives in a register, not here, so the buffer itself is
//! plain storage that the register file can reallocate or zero.

/// Samples needed to hold `seconds` of audio at `sample_rate`.
///
/// Negative or NaN durations need no samples.
#[inline]
pub fn samples_for(seconds: f32, sample_rate: f32) -> usize {
    let n = (seconds * sample_rate).ceil();
    if n > 0.0 { n as usize } else { 0 }
}

#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
}

impl DelayLine {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut d = DelayLine::default();
        d.allocate(capacity);
        d
    }

    /// Resize to exactly `capacity` zeroed samples.
    pub fn allocate(&mut self, capacity: usize) {
        self.buffer.clear();
        self.buffer.resize(capacity, 0.0);
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }

    /// Advance one sample over the first `length` slots.
    ///
    /// Returns the sample written `length` ticks ago and the next cursor.
    /// `length` is clamped to capacity; zero means pass-through.
    #[inline]
    pub fn tick(&mut self, input: f32, cursor: usize, length: usize) -> (f32, usize) {
        let length = length.min(self.buffer.len());
        if length == 0 {
            return (input, 0);
        }
        let pos = cursor % length;
        let out = self.buffer[pos];
        self.buffer[pos] = input;
        (out, (pos + 1) % length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_for_rounds_up() {
        assert_eq!(samples_for(0.0, 44100.0), 0);
        assert_eq!(samples_for(0.01, 1000.0), 10);
        assert_eq!(samples_for(0.0105, 1000.0), 11);
        assert_eq!(samples_for(-1.0, 1000.0), 0);
        assert_eq!(samples_for(f32::NAN, 1000.0), 0);
    }

    #[test]
    fn outputs_input_after_length_ticks() {
        let mut d = DelayLine::with_capacity(8);
        let mut cursor = 0;
        let mut out = Vec::new();
        for i in 0..8 {
            let (o, c) = d.tick(i as f32, cursor, 3);
            out.push(o);
            cursor = c;
        }
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn zero_length_passes_through() {
        let mut d = DelayLine::with_capacity(4);
        assert_eq!(d.tick(0.7, 2, 0), (0.7, 0));
    }

    #[test]
    fn length_clamped_to_capacity() {
        let mut d = DelayLine::with_capacity(2);
        let (_, c) = d.tick(1.0, 0, 100);
        let (_, c) = d.tick(2.0, c, 100);
        let (o, _) = d.tick(3.0, c, 100);
        assert_eq!(o, 1.0);
    }

    #[test]
    fn shrinking_length_wraps_cursor() {
        let mut d = DelayLine::with_capacity(8);
        let (_, c) = d.tick(1.0, 6, 2);
        assert!(c < 2);
    }
}
