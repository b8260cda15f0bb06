/// `protocol.rs` - the fixed marshalling schema between host and script
///
/// The host works with plain structs; the dynamic Lua table exists only at
/// this boundary. `bind_inputs` writes the per-call inputs into the
/// persistent state table, the small readers below interpret what
/// `process` handed back.

use mlua::{Table, Value};
use serde::{Deserialize, Serialize};

/// Host-refreshed modulation inputs, bound into the state table before
/// every call. Field names follow the host's parameter block; the Lua-side
/// keys are flattened (`start_phase` binds as `startphase`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub sustain: f32,
    pub release: f32,
    pub rate: f32,
    pub start_phase: f32,
    pub amplitude: f32,
    pub deform: f32,
    pub tempo: f32,
    pub song_pos: f32,
}

impl Default for ModParams {
    fn default() -> Self {
        Self {
            delay: 0.0,
            attack: 0.0,
            hold: 0.0,
            sustain: 0.0,
            release: 0.0,
            rate: 0.0,
            start_phase: 0.0,
            amplitude: 0.0,
            deform: 0.0,
            tempo: 120.0,
            song_pos: 0.0,
        }
    }
}

/// Write the per-call inputs into `state`. `intphase` lands as a Lua
/// integer, everything else as a number. Retrigger requests are one-shot,
/// so both flags are unset before every call.
pub(crate) fn bind_inputs(
    state: &Table,
    int_phase: i32,
    phase: f32,
    params: &ModParams,
) -> mlua::Result<()> {
    state.set("intphase", int_phase)?;
    state.set("phase", phase)?;
    state.set("delay", params.delay)?;
    state.set("attack", params.attack)?;
    state.set("hold", params.hold)?;
    state.set("sustain", params.sustain)?;
    state.set("release", params.release)?;
    state.set("rate", params.rate)?;
    state.set("amplitude", params.amplitude)?;
    state.set("startphase", params.start_phase)?;
    state.set("deform", params.deform)?;
    state.set("tempo", params.tempo)?;
    state.set("songpos", params.song_pos)?;
    state.set("retrigger_AEG", Value::Nil)?;
    state.set("retrigger_FEG", Value::Nil)?;
    Ok(())
}

/// Lua integer or number as f32; anything else is None.
pub(crate) fn number_from(value: &Value) -> Option<f32> {
    match value {
        Value::Integer(i) => Some(*i as f32),
        Value::Number(n) => Some(*n as f32),
        _ => None,
    }
}

/// The numeric `output` field of a returned table, if present.
pub(crate) fn output_from(table: &Table) -> Option<f32> {
    match table.get::<Value>("output") {
        Ok(v) => number_from(&v),
        Err(_) => None,
    }
}

/// A boolean flag from a returned table; absent or non-boolean falls back
/// to `default`.
pub(crate) fn flag_from(table: &Table, key: &str, default: bool) -> bool {
    match table.get::<Value>(key) {
        Ok(Value::Boolean(b)) => b,
        _ => default,
    }
}
