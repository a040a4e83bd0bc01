//! Register allocation for effect racks.
//!
//! [`compile`] turns an edited node list into something [`step`] can run:
//!
//! 1. Every node gets a unique ID, dense in `[0, len)`.
//! 2. Nodes marked `to_delete` are removed and the survivors renumbered
//!    in array order. Bindings follow the renumbering.
//! 3. The register template is rebuilt: builtins first, then one output
//!    register per node, then each node's parameters and private state.
//! 4. References to nodes that no longer exist become the parameter's
//!    default constant.
//!
//! Compiling an unedited rack again yields the same layout.
//!
//! [`step`]: crate::dsp::engine::step

use std::sync::atomic::{AtomicU64, Ordering};

use crate::rack::{
    Binding, Builtin, EffectKind, EffectRack, MAX_DELAY_SECONDS, Param, RegisterIdx,
};
use crate::dsp::registers::RegisterTemplate;

/// Template versions are unique across racks, so a voice moved onto a
/// freshly loaded rack never mistakes it for the one it already saw.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

// ── Public API ──────────────────────────────────────────────

/// Assign IDs, drop deleted nodes, and (re)allocate every register.
pub fn compile(rack: &mut EffectRack) {
    assign_ids(rack);
    if rack.effects.iter().any(|e| e.to_delete) {
        compact(rack);
    }
    allocate(rack);

    if rack.debug_cursor.is_some_and(|i| i >= rack.effects.len()) {
        rack.debug_cursor = None;
    }

    log::debug!(
        "compiled effect rack '{}': {} nodes, {} registers, {} buffers",
        rack.name,
        rack.effects.len(),
        rack.template.len(),
        rack.template.buffer_seconds().len()
    );
}

// ── IDs ─────────────────────────────────────────────────────

/// Give every node without a usable ID the smallest free one.
///
/// IDs that are out of range, or already taken by an earlier node, count
/// as unassigned.
fn assign_ids(rack: &mut EffectRack) {
    let n = rack.effects.len();
    let mut taken = vec![false; n];

    for effect in &mut rack.effects {
        match effect.id {
            Some(id) if (id as usize) < n && !taken[id as usize] => taken[id as usize] = true,
            _ => effect.id = None,
        }
    }

    let mut next_free = 0;
    for effect in &mut rack.effects {
        if effect.id.is_none() {
            while taken[next_free] {
                next_free += 1;
            }
            taken[next_free] = true;
            effect.id = Some(next_free as u32);
        }
    }

    assert!(taken.iter().all(|&t| t), "effect IDs are not a dense permutation");
    rebuild_positions(rack);
}

fn rebuild_positions(rack: &mut EffectRack) {
    rack.positions.clear();
    rack.positions.resize(rack.effects.len(), usize::MAX);
    for (pos, effect) in rack.effects.iter().enumerate() {
        if let Some(id) = effect.id {
            rack.positions[id as usize] = pos;
        }
    }
}

/// Remove deleted nodes and renumber the survivors `0..survivors` in array
/// order, rewriting node references to match. References to deleted nodes
/// are demoted to their default constant.
fn compact(rack: &mut EffectRack) {
    let mut remap: Vec<Option<u32>> = vec![None; rack.effects.len()];
    let mut next = 0;
    for effect in &rack.effects {
        if effect.to_delete {
            continue;
        }
        if let Some(id) = effect.id {
            remap[id as usize] = Some(next);
            next += 1;
        }
    }

    let before = rack.effects.len();
    rack.effects.retain(|e| !e.to_delete);
    log::debug!("removed {} deleted effect(s)", before - rack.effects.len());

    for effect in &mut rack.effects {
        effect.id = effect.id.and_then(|id| remap[id as usize]);
        effect.value.for_each_param_mut(|param, default| {
            if let Binding::Effect(old) = param.binding {
                param.binding = match remap.get(old as usize).copied().flatten() {
                    Some(new) => Binding::Effect(new),
                    None => {
                        log::debug!("reference to deleted effect {old} demoted to {default}");
                        Binding::Constant(default)
                    }
                };
            }
        });
    }

    rebuild_positions(rack);
}

// ── Registers ───────────────────────────────────────────────

fn allocate(rack: &mut EffectRack) {
    let EffectRack { effects, positions, template, .. } = rack;

    let version = NEXT_VERSION.fetch_add(1, Ordering::Relaxed);
    template.clear();

    for _ in Builtin::ALL {
        template.allocate(0.0, false);
    }

    // Outputs persist so feedback (and later-node reads) see last sample's value.
    for effect in effects.iter_mut() {
        effect.dst = template.allocate(0.0, true);
    }
    let dsts: Vec<RegisterIdx> = effects.iter().map(|e| e.dst).collect();

    for effect in effects.iter_mut() {
        allocate_state(&mut effect.value, template);
        effect.value.for_each_param_mut(|param, default| {
            param.reg = resolve(param, default, positions, &dsts, template);
        });
        if let EffectKind::Delay(d) = &mut effect.value {
            d.buffer = template.allocate_buffer(nominal_delay_seconds(&d.seconds));
        }
    }

    template.seal(version, effects.iter().map(|e| e.value.node_type()));
}

/// Private per-voice state. Always persisted.
fn allocate_state(kind: &mut EffectKind, template: &mut RegisterTemplate) {
    match kind {
        EffectKind::Oscillator(o) => {
            o.t = template.allocate(0.0, true);
        }
        EffectKind::Envelope(e) => {
            e.stage = template.allocate(0.0, true);
            e.value = template.allocate(0.0, true);
        }
        EffectKind::Delay(d) => {
            d.cursor = template.allocate(0.0, true);
        }
        EffectKind::Biquad(b) => {
            b.z1 = template.allocate(0.0, true);
            b.z2 = template.allocate(0.0, true);
        }
        EffectKind::Maths(_) | EffectKind::Switch(_) | EffectKind::Noise(_) => {}
    }
}

fn resolve(
    param: &mut Param,
    default: f32,
    positions: &[usize],
    dsts: &[RegisterIdx],
    template: &mut RegisterTemplate,
) -> RegisterIdx {
    match param.binding {
        Binding::Unset => template.allocate(default, false),
        Binding::Constant(v) => template.allocate(v, false),
        Binding::Builtin(b) => b.reg(),
        Binding::Effect(id) => match positions.get(id as usize) {
            Some(&pos) => dsts[pos],
            None => {
                log::debug!("reference to missing effect {id} demoted to {default}");
                param.binding = Binding::Constant(default);
                template.allocate(default, false)
            }
        },
    }
}

/// Buffer size a delay needs: its constant duration, or the maximum when
/// the duration is modulated.
fn nominal_delay_seconds(seconds: &Param) -> f32 {
    let requested = match seconds.binding {
        Binding::Constant(v) => v,
        Binding::Unset => crate::rack::Delay::SECONDS_DEFAULT,
        Binding::Builtin(_) | Binding::Effect(_) => MAX_DELAY_SECONDS,
    };
    if requested > MAX_DELAY_SECONDS {
        log::warn!("delay of {requested}s clamped to {MAX_DELAY_SECONDS}s");
        MAX_DELAY_SECONDS
    } else if requested > 0.0 {
        requested
    } else {
        0.0
    }
}
