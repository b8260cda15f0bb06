/// `cache.rs` - compiled-script cache, one per interpreter context
///
/// Keyed by a formula's 64-bit content hash. A hit hands back the already
/// compiled, already sandboxed callable. When two different texts land on
/// the same hash the cache warns and recompiles rather than ever run the
/// wrong script; the fresh entry replaces the colliding one.

use std::collections::HashMap;

use mlua::{Function, Lua, Value};

use crate::diagnostics::DiagnosticKind;
use crate::sandbox::install_math_env;
use crate::source::FormulaSource;

struct CacheEntry {
    source: String,
    callable: Function,
}

/// Outcome of resolving a formula against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Entry reused as-is; nothing compiled.
    Cached,
    /// Fresh compile (first sight, or after a collision displaced the old entry).
    Compiled { collision: bool },
    /// Compile or entry-point validation failed; nothing cached.
    Failed {
        collision: bool,
        kind: DiagnosticKind,
        message: String,
    },
}

#[derive(Default)]
pub struct ScriptCache {
    entries: HashMap<u64, CacheEntry>,
    compiles: u64,
}

impl ScriptCache {
    /// Find or build the sandboxed callable for `formula`.
    pub fn resolve(&mut self, lua: &Lua, formula: &FormulaSource) -> Resolution {
        let hash = formula.hash();
        let mut collision = false;
        if let Some(entry) = self.entries.get(&hash) {
            if entry.source == formula.text() {
                return Resolution::Cached;
            }
            // Same hash, different text. The cached callable must not run.
            collision = true;
            log::warn!("[formula] hash collision on {hash:#018x}, recompiling");
        }

        self.compiles += 1;
        if let Err(e) = lua.load(formula.text()).set_name("formula").exec() {
            // The chunk may have defined `process` before raising
            clear_entry_point(lua);
            return Resolution::Failed {
                collision,
                kind: DiagnosticKind::CompileError,
                message: format!("Lua raised an error parsing formula: {e}"),
            };
        }

        let entry_point: Value = match lua.globals().get("process") {
            Ok(v) => v,
            Err(e) => {
                return Resolution::Failed {
                    collision,
                    kind: DiagnosticKind::CompileError,
                    message: format!("Failed to prepare 'process' function. {e}"),
                }
            }
        };
        clear_entry_point(lua);

        let callable = match entry_point {
            Value::Function(f) => f,
            _ => {
                return Resolution::Failed {
                    collision,
                    kind: DiagnosticKind::MissingEntryPoint,
                    message: "After parsing formula, no function 'process' present. \
                              You must define a function called 'process' in your Lua."
                        .to_string(),
                }
            }
        };

        if let Err(e) = install_math_env(lua, &callable) {
            return Resolution::Failed {
                collision,
                kind: DiagnosticKind::CompileError,
                message: format!("Failed to prepare 'process' function. {e}"),
            };
        }

        self.entries.insert(
            hash,
            CacheEntry {
                source: formula.text().to_string(),
                callable,
            },
        );
        Resolution::Compiled { collision }
    }

    pub fn callable(&self, hash: u64) -> Option<&Function> {
        self.entries.get(&hash).map(|e| &e.callable)
    }

    /// Compile attempts so far, cache hits excluded.
    pub fn compile_count(&self) -> u64 {
        self.compiles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drop the `process` global so one formula's definition cannot leak into
/// the next compile.
fn clear_entry_point(lua: &Lua) {
    let _ = lua.globals().set("process", Value::Nil);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::create_restricted_vm;

    const SAW: &str = "function process(t) t.output = t.phase * 2 - 1 return t end";
    const FLAT: &str = "function process(t) t.output = 0 return t end";

    #[test]
    fn second_resolve_is_a_hit() {
        let lua = create_restricted_vm().unwrap();
        let mut cache = ScriptCache::default();
        let formula = FormulaSource::new(SAW);

        assert_eq!(cache.resolve(&lua, &formula), Resolution::Compiled { collision: false });
        assert_eq!(cache.resolve(&lua, &formula), Resolution::Cached);
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn collision_recompiles_and_replaces_entry() {
        let lua = create_restricted_vm().unwrap();
        let mut cache = ScriptCache::default();
        let first = FormulaSource::with_hash(SAW, 7);
        let second = FormulaSource::with_hash(FLAT, 7);

        assert_eq!(cache.resolve(&lua, &first), Resolution::Compiled { collision: false });
        assert_eq!(cache.resolve(&lua, &second), Resolution::Compiled { collision: true });
        assert_eq!(cache.compile_count(), 2);

        // Replacement entry now owns the slot
        assert_eq!(cache.resolve(&lua, &second), Resolution::Cached);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_process_leaves_no_entry() {
        let lua = create_restricted_vm().unwrap();
        let mut cache = ScriptCache::default();
        let formula = FormulaSource::new("x = 1");

        match cache.resolve(&lua, &formula) {
            Resolution::Failed { kind, .. } => assert_eq!(kind, DiagnosticKind::MissingEntryPoint),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(cache.is_empty());
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn syntax_error_leaves_no_entry() {
        let lua = create_restricted_vm().unwrap();
        let mut cache = ScriptCache::default();
        let formula = FormulaSource::new("function process(");

        match cache.resolve(&lua, &formula) {
            Resolution::Failed { kind, message, .. } => {
                assert_eq!(kind, DiagnosticKind::CompileError);
                assert!(message.contains("parsing formula"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_point_global_is_cleared_after_resolve() {
        let lua = create_restricted_vm().unwrap();
        let mut cache = ScriptCache::default();

        cache.resolve(&lua, &FormulaSource::new(SAW));
        let leftover: Value = lua.globals().get("process").unwrap();
        assert!(leftover.is_nil());

        // A non-function binding is rejected and cleared too
        cache.resolve(&lua, &FormulaSource::new("process = 5"));
        let leftover: Value = lua.globals().get("process").unwrap();
        assert!(leftover.is_nil());
    }
}
