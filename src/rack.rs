//! Effect rack data model.
//!
//! A rack is an ordered list of effect nodes. Every node parameter is a
//! [`Param`]: a [`Binding`] saying where the value comes from, plus the
//! register index the compiler resolved it to. Nodes never hold run-time
//! values; oscillator phases, envelope levels, filter taps and delay lines
//! all live in a per-voice [`RegisterFile`](crate::dsp::registers::RegisterFile).
//!
//! The wire format (see [`crate::codec`]) mirrors these types directly:
//! everything marked `#[serde(skip)]` is regenerated by compilation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dsp::registers::RegisterTemplate;
use crate::error::UnknownTag;

// ── Limits & Constants ──────────────────────────────────────

/// Longest delay any delay node may buffer, in seconds.
pub const MAX_DELAY_SECONDS: f32 = 5.0;

/// Gate magnitude above which the raw signal register reads 1.
pub const SIGNAL_EPSILON: f32 = 1e-7;

/// Number of builtin registers at the start of every register file.
pub const BUILTIN_COUNT: usize = Builtin::ALL.len();

// ── Register & Buffer Indices ───────────────────────────────

/// Index of a scalar slot in a register file.
///
/// Only meaningful relative to the rack that allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterIdx(u32);

impl RegisterIdx {
    /// Unbound. Reading or writing it panics.
    pub const NONE: RegisterIdx = RegisterIdx(u32::MAX);

    pub const fn new(idx: usize) -> Self {
        RegisterIdx(idx as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for RegisterIdx {
    fn default() -> Self {
        RegisterIdx::NONE
    }
}

/// Index of a ring buffer in a register file. Only delay nodes own one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferIdx(u32);

impl BufferIdx {
    pub const NONE: BufferIdx = BufferIdx(u32::MAX);

    pub const fn new(idx: usize) -> Self {
        BufferIdx(idx as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for BufferIdx {
    fn default() -> Self {
        BufferIdx::NONE
    }
}

// ── Builtin Registers ───────────────────────────────────────

/// Per-call inputs written into the first registers of every voice.
///
/// The discriminants are both the register index and the wire `regIdx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Builtin {
    KeyFrequency = 0,
    Signal = 1,
    /// `1 / sampleRate`.
    SampleDt = 2,
    /// Binarized signal: 1 while the gate is held, else 0.
    SignalRaw = 3,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [
        Builtin::KeyFrequency,
        Builtin::Signal,
        Builtin::SampleDt,
        Builtin::SignalRaw,
    ];

    #[inline]
    pub const fn reg(self) -> RegisterIdx {
        RegisterIdx::new(self as usize)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::KeyFrequency => "Key frequency",
            Builtin::Signal => "Signal",
            Builtin::SampleDt => "Sample dt",
            Builtin::SignalRaw => "Raw signal",
        }
    }
}

impl TryFrom<u8> for Builtin {
    type Error = UnknownTag;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Builtin::ALL
            .get(tag as usize)
            .copied()
            .ok_or(UnknownTag { what: "builtin register", tag })
    }
}

impl From<Builtin> for u8 {
    fn from(b: Builtin) -> u8 {
        b as u8
    }
}

// ── Bindings ────────────────────────────────────────────────

/// Where a parameter's run-time value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "BindingWire", into = "BindingWire")]
pub enum Binding {
    /// Nothing chosen yet; compiles to the parameter's default constant.
    #[default]
    Unset,
    Constant(f32),
    Builtin(Builtin),
    /// The output of the node with this stable ID.
    Effect(u32),
}

/// `{ value?, regIdx?, effectId? }`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BindingWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reg_idx: Option<Builtin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    effect_id: Option<u32>,
}

impl From<BindingWire> for Binding {
    fn from(w: BindingWire) -> Self {
        match (w.effect_id, w.reg_idx, w.value) {
            (Some(id), _, _) => Binding::Effect(id),
            (None, Some(b), _) => Binding::Builtin(b),
            (None, None, Some(v)) => Binding::Constant(v),
            (None, None, None) => Binding::Unset,
        }
    }
}

impl From<Binding> for BindingWire {
    fn from(b: Binding) -> Self {
        let mut w = BindingWire::default();
        match b {
            Binding::Unset => {}
            Binding::Constant(v) => w.value = Some(v),
            Binding::Builtin(r) => w.reg_idx = Some(r),
            Binding::Effect(id) => w.effect_id = Some(id),
        }
        w
    }
}

/// A bound node parameter. Serializes as its binding alone.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Param {
    pub binding: Binding,
    #[serde(skip)]
    pub(crate) reg: RegisterIdx,
}

impl Param {
    pub fn new(binding: Binding) -> Self {
        Param { binding, reg: RegisterIdx::NONE }
    }

    pub fn constant(value: f32) -> Self {
        Param::new(Binding::Constant(value))
    }

    pub fn builtin(b: Builtin) -> Self {
        Param::new(Binding::Builtin(b))
    }

    pub fn effect(id: u32) -> Self {
        Param::new(Binding::Effect(id))
    }

    /// Register this parameter was compiled to.
    #[inline]
    pub fn reg(&self) -> RegisterIdx {
        self.reg
    }
}

// ── Oscillator ──────────────────────────────────────────────

/// Waveform shapes. Discriminants are stable wire constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Waveform {
    #[default]
    Sine = 0,
    Square = 1,
    Sawtooth = 2,
    Triangle = 3,
    /// Sawtooth falling from +1 to -1.
    ReverseSawtooth = 4,
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Triangle,
        Waveform::ReverseSawtooth,
    ];
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Waveform::Sine => "sin",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
            Waveform::ReverseSawtooth => "-sawtooth",
        })
    }
}

impl TryFrom<u8> for Waveform {
    type Error = UnknownTag;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Waveform::ALL
            .get(tag as usize)
            .copied()
            .ok_or(UnknownTag { what: "waveform", tag })
    }
}

impl From<Waveform> for u8 {
    fn from(w: Waveform) -> u8 {
        w as u8
    }
}

/// Periodic waveform generator with a per-voice phase accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Oscillator {
    pub waveform: Waveform,
    pub amplitude: Param,
    pub frequency: Param,
    pub frequency_mult: Param,
    /// Phase offset in turns.
    pub phase: Param,
    /// DC offset added to the scaled waveform.
    pub offset: Param,

    #[serde(skip)]
    pub(crate) t: RegisterIdx,
}

impl Oscillator {
    pub const AMPLITUDE_DEFAULT: f32 = 1.0;
    pub const FREQUENCY_DEFAULT: f32 = 440.0;
    pub const FREQUENCY_MULT_DEFAULT: f32 = 1.0;
    pub const PHASE_DEFAULT: f32 = 0.0;
    pub const OFFSET_DEFAULT: f32 = 0.0;

    pub fn new() -> Self {
        Oscillator {
            waveform: Waveform::Sine,
            amplitude: Param::constant(Self::AMPLITUDE_DEFAULT),
            frequency: Param::builtin(Builtin::KeyFrequency),
            frequency_mult: Param::constant(Self::FREQUENCY_MULT_DEFAULT),
            phase: Param::constant(Self::PHASE_DEFAULT),
            offset: Param::constant(Self::OFFSET_DEFAULT),
            t: RegisterIdx::NONE,
        }
    }

    /// Phase accumulator register.
    pub fn phase_reg(&self) -> RegisterIdx {
        self.t
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Envelope ────────────────────────────────────────────────

/// Linear attack/decay/sustain/release envelope applied to `to_modulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Envelope {
    /// Gate that pumps the envelope.
    pub signal: Param,
    /// Seconds from 0 to 1.
    pub attack: Param,
    /// Seconds from 1 to the sustain level.
    pub decay: Param,
    pub sustain: Param,
    /// Seconds from the current level to 0.
    pub release: Param,
    /// The signal being shaped.
    pub to_modulate: Param,

    #[serde(skip)]
    pub(crate) stage: RegisterIdx,
    #[serde(skip)]
    pub(crate) value: RegisterIdx,
}

impl Envelope {
    pub const SIGNAL_DEFAULT: f32 = 0.0;
    pub const ATTACK_DEFAULT: f32 = 0.02;
    pub const DECAY_DEFAULT: f32 = 0.1;
    pub const SUSTAIN_DEFAULT: f32 = 0.2;
    pub const RELEASE_DEFAULT: f32 = 0.2;
    pub const TO_MODULATE_DEFAULT: f32 = 1.0;

    pub fn new() -> Self {
        Envelope {
            signal: Param::builtin(Builtin::Signal),
            attack: Param::constant(Self::ATTACK_DEFAULT),
            decay: Param::constant(Self::DECAY_DEFAULT),
            sustain: Param::constant(Self::SUSTAIN_DEFAULT),
            release: Param::constant(Self::RELEASE_DEFAULT),
            to_modulate: Param::constant(Self::TO_MODULATE_DEFAULT),
            stage: RegisterIdx::NONE,
            value: RegisterIdx::NONE,
        }
    }

    pub fn stage_reg(&self) -> RegisterIdx {
        self.stage
    }

    pub fn level_reg(&self) -> RegisterIdx {
        self.value
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

// ── Maths ───────────────────────────────────────────────────

/// Sum of products: `Σ_terms Π_coefficients`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Maths {
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Term {
    /// An empty list multiplies to 1.
    pub coefficients: Vec<Param>,
}

impl Maths {
    pub const COEFFICIENT_DEFAULT: f32 = 1.0;

    pub fn new() -> Self {
        Maths { terms: Vec::new() }
    }
}

impl Term {
    pub fn new() -> Self {
        Term { coefficients: vec![Param::constant(Maths::COEFFICIENT_DEFAULT)] }
    }

    pub fn of(coefficients: impl IntoIterator<Item = Param>) -> Self {
        Term { coefficients: coefficients.into_iter().collect() }
    }
}

impl Default for Term {
    fn default() -> Self {
        Self::new()
    }
}

// ── Switch ──────────────────────────────────────────────────

/// Comparison used by a switch condition. Wire values start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SwitchOp {
    #[default]
    LessThan = 1,
    GreaterThan = 2,
}

impl SwitchOp {
    #[inline]
    pub fn test(self, a: f32, b: f32) -> bool {
        match self {
            SwitchOp::LessThan => a < b,
            SwitchOp::GreaterThan => a > b,
        }
    }
}

impl fmt::Display for SwitchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwitchOp::LessThan => "<",
            SwitchOp::GreaterThan => ">",
        })
    }
}

impl TryFrom<u8> for SwitchOp {
    type Error = UnknownTag;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(SwitchOp::LessThan),
            2 => Ok(SwitchOp::GreaterThan),
            _ => Err(UnknownTag { what: "switch operator", tag }),
        }
    }
}

impl From<SwitchOp> for u8 {
    fn from(op: SwitchOp) -> u8 {
        op as u8
    }
}

/// First matching condition wins; `default` if none match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Switch {
    pub conditions: Vec<Condition>,
    pub default: Param,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub a: Param,
    pub operator: SwitchOp,
    pub b: Param,
    pub then: Param,
}

impl Switch {
    pub const DEFAULT_DEFAULT: f32 = 0.0;
    pub const OPERAND_DEFAULT: f32 = 0.0;

    pub fn new() -> Self {
        Switch {
            conditions: vec![Condition::new()],
            default: Param::constant(Self::DEFAULT_DEFAULT),
        }
    }
}

impl Default for Switch {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    pub fn new() -> Self {
        Condition {
            a: Param::constant(Switch::OPERAND_DEFAULT),
            operator: SwitchOp::LessThan,
            b: Param::constant(Switch::OPERAND_DEFAULT),
            then: Param::constant(Switch::OPERAND_DEFAULT),
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

// ── Noise ───────────────────────────────────────────────────

/// Full-scale white noise, gated on by a nonzero amplitude.
///
/// Only whether `amplitude` is nonzero matters; its magnitude does not
/// scale the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Noise {
    pub amplitude: Param,
}

impl Noise {
    pub const AMPLITUDE_DEFAULT: f32 = 1.0;

    pub fn new() -> Self {
        Noise { amplitude: Param::constant(Self::AMPLITUDE_DEFAULT) }
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

// ── Delay ───────────────────────────────────────────────────

/// Ring-buffer delay line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delay {
    pub signal: Param,
    /// Delay length in seconds, clamped to the allocated buffer.
    pub seconds: Param,

    #[serde(skip)]
    pub(crate) cursor: RegisterIdx,
    #[serde(skip)]
    pub(crate) buffer: BufferIdx,
}

impl Delay {
    pub const SIGNAL_DEFAULT: f32 = 0.0;
    pub const SECONDS_DEFAULT: f32 = 0.1;

    pub fn new() -> Self {
        Delay {
            signal: Param::constant(Self::SIGNAL_DEFAULT),
            seconds: Param::constant(Self::SECONDS_DEFAULT),
            cursor: RegisterIdx::NONE,
            buffer: BufferIdx::NONE,
        }
    }

    pub fn buffer(&self) -> BufferIdx {
        self.buffer
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

// ── Biquad ──────────────────────────────────────────────────

/// Direct form 2 biquad with caller-supplied, `a0`-normalized coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Biquad {
    pub signal: Param,
    pub a1: Param,
    pub a2: Param,
    pub b0: Param,
    pub b1: Param,
    pub b2: Param,

    #[serde(skip)]
    pub(crate) z1: RegisterIdx,
    #[serde(skip)]
    pub(crate) z2: RegisterIdx,
}

impl Biquad {
    pub const SIGNAL_DEFAULT: f32 = 0.0;
    pub const A1_DEFAULT: f32 = 0.0;
    pub const A2_DEFAULT: f32 = 0.0;
    pub const B0_DEFAULT: f32 = 1.0;
    pub const B1_DEFAULT: f32 = 0.0;
    pub const B2_DEFAULT: f32 = 0.0;

    /// An identity filter.
    pub fn new() -> Self {
        Biquad {
            signal: Param::constant(Self::SIGNAL_DEFAULT),
            a1: Param::constant(Self::A1_DEFAULT),
            a2: Param::constant(Self::A2_DEFAULT),
            b0: Param::constant(Self::B0_DEFAULT),
            b1: Param::constant(Self::B1_DEFAULT),
            b2: Param::constant(Self::B2_DEFAULT),
            z1: RegisterIdx::NONE,
            z2: RegisterIdx::NONE,
        }
    }

    /// Binds every coefficient to a constant.
    pub fn with_coefficients(mut self, c: crate::dsp::filter::Coefficients) -> Self {
        self.a1 = Param::constant(c.a1);
        self.a2 = Param::constant(c.a2);
        self.b0 = Param::constant(c.b0);
        self.b1 = Param::constant(c.b1);
        self.b2 = Param::constant(c.b2);
        self
    }

    pub fn state_regs(&self) -> (RegisterIdx, RegisterIdx) {
        (self.z1, self.z2)
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

// ── Nodes ───────────────────────────────────────────────────

/// Node type tags. Stable wire constants; new variants append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Oscillator = 0,
    Envelope = 1,
    Maths = 2,
    Switch = 3,
    Noise = 4,
    Delay = 5,
    Biquad = 6,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Oscillator,
        NodeType::Envelope,
        NodeType::Maths,
        NodeType::Switch,
        NodeType::Noise,
        NodeType::Delay,
        NodeType::Biquad,
    ];

    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        usize::try_from(tag).ok().and_then(|i| NodeType::ALL.get(i).copied())
    }
}

/// The closed set of node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectKind {
    Oscillator(Oscillator),
    Envelope(Envelope),
    Maths(Maths),
    Switch(Switch),
    Noise(Noise),
    Delay(Delay),
    Biquad(Biquad),
}

impl EffectKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            EffectKind::Oscillator(_) => NodeType::Oscillator,
            EffectKind::Envelope(_) => NodeType::Envelope,
            EffectKind::Maths(_) => NodeType::Maths,
            EffectKind::Switch(_) => NodeType::Switch,
            EffectKind::Noise(_) => NodeType::Noise,
            EffectKind::Delay(_) => NodeType::Delay,
            EffectKind::Biquad(_) => NodeType::Biquad,
        }
    }

    /// Visit every parameter along with the constant it falls back to.
    pub fn for_each_param_mut(&mut self, mut f: impl FnMut(&mut Param, f32)) {
        match self {
            EffectKind::Oscillator(o) => {
                f(&mut o.amplitude, Oscillator::AMPLITUDE_DEFAULT);
                f(&mut o.frequency, Oscillator::FREQUENCY_DEFAULT);
                f(&mut o.frequency_mult, Oscillator::FREQUENCY_MULT_DEFAULT);
                f(&mut o.phase, Oscillator::PHASE_DEFAULT);
                f(&mut o.offset, Oscillator::OFFSET_DEFAULT);
            }
            EffectKind::Envelope(e) => {
                f(&mut e.signal, Envelope::SIGNAL_DEFAULT);
                f(&mut e.attack, Envelope::ATTACK_DEFAULT);
                f(&mut e.decay, Envelope::DECAY_DEFAULT);
                f(&mut e.sustain, Envelope::SUSTAIN_DEFAULT);
                f(&mut e.release, Envelope::RELEASE_DEFAULT);
                f(&mut e.to_modulate, Envelope::TO_MODULATE_DEFAULT);
            }
            EffectKind::Maths(m) => {
                for term in &mut m.terms {
                    for c in &mut term.coefficients {
                        f(c, Maths::COEFFICIENT_DEFAULT);
                    }
                }
            }
            EffectKind::Switch(s) => {
                for cond in &mut s.conditions {
                    f(&mut cond.a, Switch::OPERAND_DEFAULT);
                    f(&mut cond.b, Switch::OPERAND_DEFAULT);
                    f(&mut cond.then, Switch::OPERAND_DEFAULT);
                }
                f(&mut s.default, Switch::DEFAULT_DEFAULT);
            }
            EffectKind::Noise(n) => {
                f(&mut n.amplitude, Noise::AMPLITUDE_DEFAULT);
            }
            EffectKind::Delay(d) => {
                f(&mut d.signal, Delay::SIGNAL_DEFAULT);
                f(&mut d.seconds, Delay::SECONDS_DEFAULT);
            }
            EffectKind::Biquad(b) => {
                f(&mut b.signal, Biquad::SIGNAL_DEFAULT);
                f(&mut b.a1, Biquad::A1_DEFAULT);
                f(&mut b.a2, Biquad::A2_DEFAULT);
                f(&mut b.b0, Biquad::B0_DEFAULT);
                f(&mut b.b1, Biquad::B1_DEFAULT);
                f(&mut b.b2, Biquad::B2_DEFAULT);
            }
        }
    }
}

impl From<Oscillator> for EffectKind {
    fn from(v: Oscillator) -> Self {
        EffectKind::Oscillator(v)
    }
}

impl From<Envelope> for EffectKind {
    fn from(v: Envelope) -> Self {
        EffectKind::Envelope(v)
    }
}

impl From<Maths> for EffectKind {
    fn from(v: Maths) -> Self {
        EffectKind::Maths(v)
    }
}

impl From<Switch> for EffectKind {
    fn from(v: Switch) -> Self {
        EffectKind::Switch(v)
    }
}

impl From<Noise> for EffectKind {
    fn from(v: Noise) -> Self {
        EffectKind::Noise(v)
    }
}

impl From<Delay> for EffectKind {
    fn from(v: Delay) -> Self {
        EffectKind::Delay(v)
    }
}

impl From<Biquad> for EffectKind {
    fn from(v: Biquad) -> Self {
        EffectKind::Biquad(v)
    }
}

/// One entry in the rack.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectNode {
    /// Stable ID, dense in `[0, len)` after compilation. `None` until assigned.
    pub id: Option<u32>,
    /// Soft delete; the next compile removes the node and remaps IDs.
    pub to_delete: bool,
    /// Disabled nodes are skipped and keep their last output.
    pub enabled: bool,
    #[serde(skip)]
    pub(crate) dst: RegisterIdx,
    pub value: EffectKind,
}

impl EffectNode {
    pub fn new(value: impl Into<EffectKind>) -> Self {
        EffectNode {
            id: None,
            to_delete: false,
            enabled: true,
            dst: RegisterIdx::NONE,
            value: value.into(),
        }
    }

    /// Output register.
    #[inline]
    pub fn dst(&self) -> RegisterIdx {
        self.dst
    }
}

// ── Rack ────────────────────────────────────────────────────

/// A compiled topology. Holds no per-voice state, so one rack can drive
/// any number of voices, each with its own register file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectRack {
    pub name: String,
    /// Evaluation order. Any node may read any other node's output.
    pub effects: Vec<EffectNode>,

    /// `id -> position in effects`.
    #[serde(skip)]
    pub(crate) positions: Vec<usize>,
    #[serde(skip)]
    pub(crate) template: RegisterTemplate,
    /// Evaluate only up to and including this position.
    #[serde(skip)]
    pub debug_cursor: Option<usize>,
}

/// Summary of a compiled rack, for editors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RackInfo {
    pub node_ids: Vec<u32>,
    pub register_count: usize,
    pub buffer_count: usize,
}

impl EffectRack {
    pub fn new() -> Self {
        EffectRack {
            name: String::new(),
            effects: Vec::new(),
            positions: Vec::new(),
            template: RegisterTemplate::default(),
            debug_cursor: None,
        }
    }

    /// Append a node. It gets an ID on the next compile.
    pub fn push(&mut self, value: impl Into<EffectKind>) -> &mut EffectNode {
        self.effects.push(EffectNode::new(value));
        let last = self.effects.len() - 1;
        &mut self.effects[last]
    }

    /// Position of the node with this ID, as of the last compile.
    pub fn position_of(&self, id: u32) -> Option<usize> {
        self.positions.get(id as usize).copied()
    }

    /// Soft-delete by ID. Returns false if no such node.
    pub fn mark_deleted(&mut self, id: u32) -> bool {
        match self.effects.iter_mut().find(|e| e.id == Some(id)) {
            Some(node) => {
                node.to_delete = true;
                true
            }
            None => false,
        }
    }

    pub fn template(&self) -> &RegisterTemplate {
        &self.template
    }

    pub fn is_compiled(&self) -> bool {
        self.template.version() > 0
    }

    /// The value a parameter starts each voice with: its constant, or the
    /// template slot of the builtin or node output it reads.
    pub fn param_value(&self, param: &Param) -> f32 {
        if !param.reg.is_none() && param.reg.index() < self.template.len() {
            return self.template.values()[param.reg.index()];
        }
        match param.binding {
            Binding::Constant(v) => v,
            _ => 0.0,
        }
    }

    pub fn info(&self) -> RackInfo {
        RackInfo {
            node_ids: self.effects.iter().filter_map(|e| e.id).collect(),
            register_count: self.template.len(),
            buffer_count: self.template.buffer_seconds().len(),
        }
    }
}

impl Default for EffectRack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_occupy_first_registers_in_order() {
        for (i, b) in Builtin::ALL.iter().enumerate() {
            assert_eq!(b.reg().index(), i);
        }
        assert_eq!(BUILTIN_COUNT, 4);
    }

    #[test]
    fn wire_tags_are_stable() {
        assert_eq!(NodeType::Oscillator.tag(), 0);
        assert_eq!(NodeType::Biquad.tag(), 6);
        assert_eq!(NodeType::from_tag(5), Some(NodeType::Delay));
        assert_eq!(NodeType::from_tag(7), None);
        assert_eq!(u8::from(Waveform::ReverseSawtooth), 4);
        assert_eq!(u8::from(SwitchOp::LessThan), 1);
        assert_eq!(u8::from(SwitchOp::GreaterThan), 2);
        assert!(SwitchOp::try_from(0).is_err());
        assert!(Waveform::try_from(5).is_err());
    }

    #[test]
    fn binding_wire_shape() {
        let json = serde_json::to_string(&Param::constant(0.5)).unwrap();
        assert_eq!(json, r#"{"value":0.5}"#);
        let json = serde_json::to_string(&Param::builtin(Builtin::Signal)).unwrap();
        assert_eq!(json, r#"{"regIdx":1}"#);
        let json = serde_json::to_string(&Param::effect(3)).unwrap();
        assert_eq!(json, r#"{"effectId":3}"#);
        let json = serde_json::to_string(&Param::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn binding_effect_id_takes_precedence() {
        let p: Param = serde_json::from_str(r#"{"value":2,"regIdx":0,"effectId":1}"#).unwrap();
        assert_eq!(p.binding, Binding::Effect(1));
        let p: Param = serde_json::from_str(r#"{"value":2,"regIdx":0}"#).unwrap();
        assert_eq!(p.binding, Binding::Builtin(Builtin::KeyFrequency));
        assert!(serde_json::from_str::<Param>(r#"{"regIdx":9}"#).is_err());
    }

    #[test]
    fn display_names() {
        assert_eq!(Waveform::ReverseSawtooth.to_string(), "-sawtooth");
        assert_eq!(SwitchOp::GreaterThan.to_string(), ">");
        assert_eq!(Builtin::SignalRaw.name(), "Raw signal");
    }

    #[test]
    fn mark_deleted_finds_by_id() {
        let mut rack = EffectRack::new();
        rack.push(Noise::new()).id = Some(0);
        assert!(rack.mark_deleted(0));
        assert!(rack.effects[0].to_delete);
        assert!(!rack.mark_deleted(4));
    }

    #[test]
    fn uncompiled_param_value_falls_back_to_constant() {
        let rack = EffectRack::new();
        assert_eq!(rack.param_value(&Param::constant(3.0)), 3.0);
        assert_eq!(rack.param_value(&Param::builtin(Builtin::Signal)), 0.0);
        assert!(!rack.is_compiled());
    }
}
