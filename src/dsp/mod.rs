//! DSP: register files and the per-sample interpreter.
//!
//! Everything reachable from [`engine::step`] is safe to call from a
//! real-time audio callback: no locks, no I/O, and no allocation outside
//! the shape-change and sample-rate-change paths of
//! [`registers::RegisterFile::reconcile`].

pub mod delay;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod oscillator;
pub mod registers;
pub mod renderer;
pub mod voice;
