//! Register files: the per-voice state of an effect rack.
//!
//! The compiler produces a [`RegisterTemplate`]: initial values, a
//! persistence flag per slot, and the nominal duration of every delay
//! buffer. Each sounding voice owns a [`RegisterFile`] that is reconciled
//! against the template at the start of every sample. Only the slow paths
//! (shape change, sample-rate change) allocate.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::rack::{BufferIdx, NodeType, RegisterIdx};

use super::delay::{DelayLine, samples_for};

// ── Template ────────────────────────────────────────────────

/// Compiled initial state shared by every voice of one rack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterTemplate {
    values: Vec<f32>,
    persisted: Vec<bool>,
    buffer_seconds: Vec<f32>,
    /// Fresh on every compile, unique across racks; 0 means never compiled.
    version: u64,
    /// Identifies the register layout. Voices whose file was built for a
    /// different layout are reinitialized wholesale.
    fingerprint: u64,
}

impl RegisterTemplate {
    /// Drop every slot and buffer.
    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.persisted.clear();
        self.buffer_seconds.clear();
    }

    /// Persisted slots survive recompiles; the rest are refreshed from the
    /// template whenever the rack is recompiled.
    pub(crate) fn allocate(&mut self, initial: f32, persisted: bool) -> RegisterIdx {
        let idx = RegisterIdx::new(self.values.len());
        self.values.push(initial);
        self.persisted.push(persisted);
        idx
    }

    pub(crate) fn allocate_buffer(&mut self, seconds: f32) -> BufferIdx {
        let idx = BufferIdx::new(self.buffer_seconds.len());
        self.buffer_seconds.push(seconds);
        idx
    }

    pub(crate) fn seal(&mut self, version: u64, node_types: impl Iterator<Item = NodeType>) {
        let mut h = DefaultHasher::new();
        for t in node_types {
            t.hash(&mut h);
        }
        self.values.len().hash(&mut h);
        self.persisted.hash(&mut h);
        self.buffer_seconds.len().hash(&mut h);
        self.fingerprint = h.finish();
        self.version = version;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn persisted(&self) -> &[bool] {
        &self.persisted
    }

    pub fn buffer_seconds(&self) -> &[f32] {
        &self.buffer_seconds
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

// ── Live Instance ───────────────────────────────────────────

static NEXT_SEED: AtomicU64 = AtomicU64::new(0x5eed);

/// Live registers for one voice. Never shared between voices or racks.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    values: Vec<f32>,
    persisted: Vec<bool>,
    buffers: Vec<DelayLine>,
    /// Nominal duration each buffer was last sized for.
    buffer_seconds: Vec<f32>,
    /// Last-seen sample rate; 0 before the first reconcile.
    sample_rate: f32,
    version: Option<u64>,
    fingerprint: u64,
    rng: StdRng,
}

impl RegisterFile {
    /// An empty file with its own noise seed.
    pub fn new() -> Self {
        Self::with_seed(NEXT_SEED.fetch_add(1, Ordering::Relaxed))
    }

    /// An empty file with a fixed noise seed, for reproducible renders.
    pub fn with_seed(seed: u64) -> Self {
        RegisterFile {
            values: Vec::new(),
            persisted: Vec::new(),
            buffers: Vec::new(),
            buffer_seconds: Vec::new(),
            sample_rate: 0.0,
            version: None,
            fingerprint: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn read(&self, idx: RegisterIdx) -> f32 {
        let i = idx.index();
        assert!(i < self.values.len(), "register read {i} out of range (len {})", self.values.len());
        self.values[i]
    }

    #[inline]
    pub fn write(&mut self, idx: RegisterIdx, val: f32) {
        let i = idx.index();
        assert!(i < self.values.len(), "register write {i} out of range (len {})", self.values.len());
        self.values[i] = val;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Grow or truncate to the template length.
    pub fn ensure_capacity(&mut self, template_len: usize) {
        self.values.resize(template_len, 0.0);
        self.persisted.resize(template_len, false);
    }

    /// Bring this file in line with `template` before a sample is computed.
    ///
    /// - Layout changed, or a fresh trigger: every value is copied from the template.
    /// - Recompiled with the same layout: only non-persisted values are copied.
    /// - Layout or sample rate changed: every buffer is reallocated to
    ///   `ceil(seconds * sample_rate)` samples and its contents are lost.
    /// - Recompiled with the same layout: only buffers whose duration
    ///   changed are reallocated.
    /// - Fresh trigger otherwise: buffers are zeroed in place.
    pub fn reconcile(&mut self, template: &RegisterTemplate, sample_rate: f32, freshly_triggered: bool) {
        let shape_changed = self.version.is_none()
            || self.fingerprint != template.fingerprint
            || self.values.len() != template.len();
        let recompiled = self.version != Some(template.version);
        let rate_changed = self.sample_rate != sample_rate;

        if shape_changed {
            self.ensure_capacity(template.len());
            self.persisted.copy_from_slice(&template.persisted);
            self.fingerprint = template.fingerprint;
        }

        if shape_changed || freshly_triggered {
            self.values.copy_from_slice(&template.values);
        } else if recompiled {
            for ((v, &t), &keep) in self.values.iter_mut().zip(&template.values).zip(&self.persisted) {
                if !keep {
                    *v = t;
                }
            }
        }
        self.version = Some(template.version);

        if shape_changed || rate_changed {
            self.buffers.resize_with(template.buffer_seconds.len(), DelayLine::default);
            for (buf, &seconds) in self.buffers.iter_mut().zip(&template.buffer_seconds) {
                buf.allocate(samples_for(seconds, sample_rate));
            }
            self.buffer_seconds.clone_from(&template.buffer_seconds);
            self.sample_rate = sample_rate;
            return;
        }

        if recompiled {
            let sized = self.buffers.iter_mut().zip(&mut self.buffer_seconds);
            for ((buf, seen), &seconds) in sized.zip(&template.buffer_seconds) {
                if seen.to_bits() != seconds.to_bits() {
                    buf.allocate(samples_for(seconds, sample_rate));
                    *seen = seconds;
                }
            }
        }
        if freshly_triggered {
            for buf in &mut self.buffers {
                buf.clear();
            }
        }
    }

    #[inline]
    pub fn buffer_mut(&mut self, idx: BufferIdx) -> &mut DelayLine {
        &mut self.buffers[idx.index()]
    }

    pub fn buffer(&self, idx: BufferIdx) -> &DelayLine {
        &self.buffers[idx.index()]
    }

    /// Uniform sample in `[-1, 1]`.
    #[inline]
    pub fn noise(&mut self) -> f32 {
        self.rng.gen_range(-1.0..=1.0)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> RegisterTemplate {
        let mut t = RegisterTemplate::default();
        t.allocate(1.0, false);
        t.allocate(2.0, true);
        t.allocate_buffer(0.5);
        t.seal(1, [NodeType::Delay].into_iter());
        t
    }

    #[test]
    fn first_reconcile_copies_everything() {
        let t = template();
        let mut file = RegisterFile::with_seed(1);
        file.reconcile(&t, 10.0, false);
        assert_eq!(file.values(), &[1.0, 2.0]);
        assert_eq!(file.buffer(BufferIdx::new(0)).capacity(), 5);
    }

    #[test]
    fn recompile_refreshes_only_non_persisted() {
        let mut t = template();
        let mut file = RegisterFile::with_seed(1);
        file.reconcile(&t, 10.0, false);
        file.write(RegisterIdx::new(0), 7.0);
        file.write(RegisterIdx::new(1), 8.0);

        // Same layout, new version: a constant was edited.
        t.values[0] = 3.0;
        t.seal(2, [NodeType::Delay].into_iter());
        file.reconcile(&t, 10.0, false);
        assert_eq!(file.values(), &[3.0, 8.0]);
    }

    #[test]
    fn unchanged_version_leaves_values_alone() {
        let t = template();
        let mut file = RegisterFile::with_seed(1);
        file.reconcile(&t, 10.0, false);
        file.write(RegisterIdx::new(0), 7.0);
        file.reconcile(&t, 10.0, false);
        assert_eq!(file.read(RegisterIdx::new(0)), 7.0);
    }

    #[test]
    fn fresh_trigger_resets_persisted_and_buffers() {
        let t = template();
        let mut file = RegisterFile::with_seed(1);
        file.reconcile(&t, 10.0, false);
        file.write(RegisterIdx::new(1), 8.0);
        file.buffer_mut(BufferIdx::new(0)).tick(4.0, 0, 5);
        file.reconcile(&t, 10.0, true);
        assert_eq!(file.values(), &[1.0, 2.0]);
        assert!(file.buffer(BufferIdx::new(0)).samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn sample_rate_change_reallocates_buffers() {
        let t = template();
        let mut file = RegisterFile::with_seed(1);
        file.reconcile(&t, 10.0, false);
        file.reconcile(&t, 44100.0, false);
        assert_eq!(file.buffer(BufferIdx::new(0)).capacity(), 22050);
        assert_eq!(file.sample_rate(), 44100.0);
    }

    #[test]
    fn duration_edit_resizes_only_that_buffer() {
        let mut t = RegisterTemplate::default();
        t.allocate(0.0, true);
        t.allocate_buffer(0.5);
        t.allocate_buffer(0.3);
        t.seal(1, [NodeType::Delay, NodeType::Delay].into_iter());

        let mut file = RegisterFile::with_seed(1);
        file.reconcile(&t, 10.0, false);
        file.write(RegisterIdx::new(0), 9.0);
        file.buffer_mut(BufferIdx::new(0)).tick(4.0, 0, 5);

        t.buffer_seconds[1] = 0.8;
        t.seal(2, [NodeType::Delay, NodeType::Delay].into_iter());
        file.reconcile(&t, 10.0, false);

        assert_eq!(file.read(RegisterIdx::new(0)), 9.0);
        assert_eq!(file.buffer(BufferIdx::new(0)).samples()[0], 4.0);
        assert_eq!(file.buffer(BufferIdx::new(1)).capacity(), 8);
    }

    #[test]
    fn ensure_capacity_resizes() {
        let mut file = RegisterFile::with_seed(1);
        file.ensure_capacity(3);
        assert_eq!(file.len(), 3);
        file.ensure_capacity(1);
        assert_eq!(file.len(), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_read_panics() {
        let file = RegisterFile::with_seed(1);
        file.read(RegisterIdx::new(0));
    }

    #[test]
    fn noise_stays_in_range() {
        let mut file = RegisterFile::with_seed(42);
        for _ in 0..10_000 {
            let n = file.noise();
            assert!((-1.0..=1.0).contains(&n), "noise out of range: {n}");
        }
    }
}
