/// `engine.rs` - the prepare / evaluate / cleanup lifecycle
///
/// The three operations a host drives a formula instance with. `prepare`
/// resolves the callable (compiling at most once per distinct text) and
/// binds a fresh persistent state table. `evaluate` runs one call of the
/// protocol. `cleanup` releases the state table. Nothing here raises
/// across the boundary: a fault turns the state invalid, evaluation
/// yields 0.0, and the host polls `is_valid` / `last_error`.

use mlua::Value;

use crate::cache::Resolution;
use crate::context::InterpreterContext;
use crate::diagnostics::DiagnosticKind;
use crate::protocol;
use crate::source::FormulaSource;
use crate::state::EvaluatorState;

const COLLISION_WARNING: &str = "Hash Collision in function. Bad luck!";

/// Resolve `formula` in `ctx` and build a fresh evaluator state for it.
///
/// Always returns a state. On failure it carries `is_valid == false` plus
/// the error text; a hash collision alone is survivable and only leaves
/// the warning behind. Hosts re-run this on every formula edit, after
/// `cleanup` of the old state.
pub fn prepare(ctx: &mut InterpreterContext, formula: &FormulaSource) -> EvaluatorState {
    let mut state = EvaluatorState::prepared(ctx.kind());
    // The serial is consumed whether or not resolution succeeds
    let name = ctx.next_state_name();

    match ctx.resolve(formula) {
        Resolution::Cached => {}
        Resolution::Compiled { collision } => {
            if collision {
                state.record(DiagnosticKind::HashCollision, COLLISION_WARNING);
            }
            log::info!(
                "[formula] compiled {:#018x} for {:?} context",
                formula.hash(),
                ctx.kind()
            );
        }
        Resolution::Failed { collision, kind, message } => {
            if collision {
                state.record(DiagnosticKind::HashCollision, COLLISION_WARNING);
            }
            state.record(kind, message);
            return state;
        }
    }
    state.callable = Some(formula.hash());

    if let Err(e) = ctx.create_state_table(&name) {
        state.record(
            DiagnosticKind::ContextUnavailable,
            format!("Failed to create state table '{name}'. {e}"),
        );
        return state;
    }
    state.state_name = Some(name);
    state
}

/// One call of the evaluation protocol: bind inputs into the persistent
/// state table, invoke `process`, interpret the result.
///
/// Never raises. An invalid, never-prepared or cleaned-up state yields
/// 0.0 silently; every new fault marks the state invalid and yields 0.0
/// until the next `prepare`.
pub fn evaluate(
    ctx: &mut InterpreterContext,
    int_phase: i32,
    phase: f32,
    state: &mut EvaluatorState,
) -> f32 {
    if !state.is_valid {
        return 0.0;
    }
    let Some(kind) = state.kind else {
        return 0.0;
    };
    let Some(name) = state.state_name.clone() else {
        // Cleaned up: inert, not an error
        return 0.0;
    };
    if kind != ctx.kind() {
        state.record(
            DiagnosticKind::ContextUnavailable,
            format!(
                "State prepared for the {:?} context was evaluated against {:?}.",
                kind,
                ctx.kind()
            ),
        );
        return 0.0;
    }

    let Some(hash) = state.callable else {
        state.record(
            DiagnosticKind::ContextUnavailable,
            "No compiled formula is bound to this state.",
        );
        return 0.0;
    };
    let Some(func) = ctx.callable(hash) else {
        state.record(
            DiagnosticKind::ContextUnavailable,
            "Compiled formula is no longer present in this context.",
        );
        return 0.0;
    };
    let Some(table) = ctx.state_table(&name) else {
        state.record(
            DiagnosticKind::ContextUnavailable,
            format!("State table '{name}' is no longer present in this context."),
        );
        return 0.0;
    };

    if let Err(e) = protocol::bind_inputs(&table, int_phase, phase, &state.params) {
        state.record(
            DiagnosticKind::ContextUnavailable,
            format!("Failed to bind inputs into '{name}'. {e}"),
        );
        return 0.0;
    }

    let returned = match func.call::<Value>(table.clone()) {
        Ok(v) => v,
        Err(e) => {
            state.record(
                DiagnosticKind::InvocationError,
                format!("Failed to evaluate 'process' function. {e}"),
            );
            return 0.0;
        }
    };

    // Bare number: the table protocol is bypassed. In-place mutations of
    // the argument table persist regardless, it is the same object as the
    // state global.
    if let Some(n) = protocol::number_from(&returned) {
        return n;
    }

    match returned {
        Value::Table(result) => {
            // The returned table becomes the persistent state from now on
            if let Err(e) = ctx.store_state_table(&name, &result) {
                state.record(
                    DiagnosticKind::ContextUnavailable,
                    format!("Failed to store state table '{name}'. {e}"),
                );
                return 0.0;
            }
            let Some(output) = protocol::output_from(&result) else {
                state.record(
                    DiagnosticKind::MissingOutputField,
                    "You must define the 'output' field in the returned table as a number",
                );
                return 0.0;
            };
            state.use_envelope = protocol::flag_from(&result, "use_envelope", true);
            state.retrigger_aeg = protocol::flag_from(&result, "retrigger_AEG", false);
            state.retrigger_feg = protocol::flag_from(&result, "retrigger_FEG", false);
            output
        }
        _ => {
            state.record(
                DiagnosticKind::MalformedResult,
                "The return of your Lua function must be a number or table. \
                 Just return input with output set.",
            );
            0.0
        }
    }
}

/// Release the state's persistent table and make the state inert.
///
/// Idempotent: a never-prepared, already-cleaned or wrong-context state is
/// a no-op. Validity and diagnostics are left alone so post-mortem polling
/// still works after teardown.
pub fn cleanup(ctx: &mut InterpreterContext, state: &mut EvaluatorState) {
    if state.kind != Some(ctx.kind()) {
        return;
    }
    if let Some(name) = state.state_name.take() {
        ctx.drop_state_table(&name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FormulaRuntime;

    fn runtime() -> FormulaRuntime {
        FormulaRuntime::new().unwrap()
    }

    #[test]
    fn default_formula_is_a_saw() {
        let mut rt = runtime();
        let ctx = rt.audio_mut();
        let mut state = prepare(ctx, &FormulaSource::init());
        assert!(state.is_valid, "{:?}", state.last_error);

        let at = |ctx: &mut InterpreterContext, state: &mut EvaluatorState, phase: f32| {
            evaluate(ctx, 0, phase, state)
        };
        assert!((at(ctx, &mut state, 0.0) - (-1.0)).abs() < 1e-6);
        assert!((at(ctx, &mut state, 0.5)).abs() < 1e-6);
        assert!((at(ctx, &mut state, 1.0) - 1.0).abs() < 1e-6);
        assert!(state.use_envelope);
        assert!(!state.retrigger_aeg);
    }

    #[test]
    fn bare_number_return_bypasses_table_protocol() {
        let mut rt = runtime();
        let ctx = rt.audio_mut();
        let formula = FormulaSource::new("function process(t) return t.phase * 0.5 end");
        let mut state = prepare(ctx, &formula);
        assert!(state.is_valid);
        let out = evaluate(ctx, 0, 0.8, &mut state);
        assert!((out - 0.4).abs() < 1e-6);
        assert!(state.is_valid);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut rt = runtime();
        let ctx = rt.audio_mut();
        let mut state = prepare(ctx, &FormulaSource::init());
        let name = state.state_name().unwrap().to_string();

        cleanup(ctx, &mut state);
        assert!(state.state_name().is_none());
        assert!(ctx.state_table(&name).is_none());
        cleanup(ctx, &mut state);

        // A default state is a no-op too
        let mut untouched = EvaluatorState::default();
        cleanup(ctx, &mut untouched);

        // Evaluation after cleanup is silent
        assert_eq!(evaluate(ctx, 0, 0.5, &mut state), 0.0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn wrong_context_marks_state_invalid() {
        let mut rt = runtime();
        let mut state = prepare(rt.audio_mut(), &FormulaSource::init());
        assert!(state.is_valid);

        let out = evaluate(rt.display_mut(), 0, 0.5, &mut state);
        assert_eq!(out, 0.0);
        assert!(!state.is_valid);
        assert_eq!(
            state.diagnostics().last().unwrap().kind,
            DiagnosticKind::ContextUnavailable
        );
    }
}
