/// `context.rs` - interpreter contexts and their registry
///
/// Exactly two contexts exist per runtime: `audio` for the real-time path
/// and `display` for UI preview. Each owns an isolated Lua VM plus the
/// compiled-script cache scoped to it, so nothing compiled or stored on
/// one side is visible from the other. `FormulaRuntime` replaces hidden
/// singletons with an explicit registry the host constructs once.

use mlua::{Function, Lua, Result as LuaResult, Table, Value};
use serde::{Deserialize, Serialize};

use crate::cache::{Resolution, ScriptCache};
use crate::sandbox::create_restricted_vm;
use crate::source::FormulaSource;

/// Seed for the display context's RNG, applied once at creation so preview
/// renders come out identical run to run.
const DISPLAY_RNG_SEED: u32 = 8675309;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Audio,
    Display,
}

impl ContextKind {
    /// Prefix for the per-instance persistent state globals.
    pub(crate) fn state_prefix(self) -> &'static str {
        match self {
            ContextKind::Audio => "audiostate_",
            ContextKind::Display => "dispstate_",
        }
    }
}

// ── InterpreterContext ────────────────────────────────────────────────────────

/// One isolated Lua VM plus its script cache and state-name counter.
///
/// A context is single-threaded by contract: after `FormulaRuntime::split`
/// it moves once to its designated thread (audio to the real-time thread,
/// display to the UI thread) and all access goes through `&mut` from then
/// on. Nothing in here blocks; compilation only happens on formula edits.
pub struct InterpreterContext {
    lua: Lua,
    kind: ContextKind,
    cache: ScriptCache,
    state_serial: i32,
}

impl InterpreterContext {
    fn new(kind: ContextKind) -> LuaResult<Self> {
        let lua = create_restricted_vm()?;
        if kind == ContextKind::Display {
            lua.load(format!("math.randomseed({DISPLAY_RNG_SEED})")).exec()?;
        }
        Ok(Self {
            lua,
            kind,
            cache: ScriptCache::default(),
            state_serial: 0,
        })
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Compiles this context has performed so far (cache hits excluded).
    pub fn compile_count(&self) -> u64 {
        self.cache.compile_count()
    }

    pub(crate) fn resolve(&mut self, formula: &FormulaSource) -> Resolution {
        self.cache.resolve(&self.lua, formula)
    }

    pub(crate) fn callable(&self, hash: u64) -> Option<Function> {
        self.cache.callable(hash).cloned()
    }

    /// Next unique state-table name for this context. The serial wraps
    /// back to 1 on i32 overflow.
    pub(crate) fn next_state_name(&mut self) -> String {
        self.state_serial = self.state_serial.checked_add(1).unwrap_or(1);
        format!("{}{}", self.kind.state_prefix(), self.state_serial)
    }

    /// Bind a fresh empty table under `name`.
    pub(crate) fn create_state_table(&self, name: &str) -> LuaResult<()> {
        let table = self.lua.create_table()?;
        self.lua.globals().set(name, table)
    }

    /// The state table bound under `name`, if it is still a table.
    pub(crate) fn state_table(&self, name: &str) -> Option<Table> {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Re-bind `table` under `name` (the script may have returned a
    /// replacement for its own state).
    pub(crate) fn store_state_table(&self, name: &str, table: &Table) -> LuaResult<()> {
        self.lua.globals().set(name, table.clone())
    }

    /// Unbind the state table. Missing binding is a no-op.
    pub(crate) fn drop_state_table(&self, name: &str) {
        let _ = self.lua.globals().set(name, Value::Nil);
    }
}

// ── FormulaRuntime ────────────────────────────────────────────────────────────

/// Owner of the two interpreter contexts.
///
/// Built once at host startup. The audio context must only ever be touched
/// from the real-time audio thread and the display context from the UI
/// thread; `split` moves each owned half to its thread and `&mut`
/// receivers keep access exclusive afterwards. No locks are taken.
pub struct FormulaRuntime {
    audio: InterpreterContext,
    display: InterpreterContext,
}

impl FormulaRuntime {
    /// Build both contexts eagerly. The display VM gets its fixed RNG seed
    /// here, once.
    pub fn new() -> LuaResult<Self> {
        Ok(Self {
            audio: InterpreterContext::new(ContextKind::Audio)?,
            display: InterpreterContext::new(ContextKind::Display)?,
        })
    }

    pub fn context_mut(&mut self, kind: ContextKind) -> &mut InterpreterContext {
        match kind {
            ContextKind::Audio => &mut self.audio,
            ContextKind::Display => &mut self.display,
        }
    }

    pub fn audio_mut(&mut self) -> &mut InterpreterContext {
        &mut self.audio
    }

    pub fn display_mut(&mut self) -> &mut InterpreterContext {
        &mut self.display
    }

    /// Move the contexts out (audio first) to hand each to its thread.
    pub fn split(self) -> (InterpreterContext, InterpreterContext) {
        (self.audio, self.display)
    }
}
