//! Cached, sandboxed Lua formula evaluation for per-sample synth modulation.
//!
//! A host hands each modulation slot a user-authored formula; this crate
//! compiles it once, runs it inside a math-only environment, and turns every
//! call into one `f32`. Two isolated interpreter contexts exist per
//! [`FormulaRuntime`]: `audio` for the real-time path and `display` for UI
//! preview. Faults never raise across the boundary; evaluation yields 0.0
//! and the host polls the state for the error.
//!
//! ```no_run
//! use modscript::{evaluate, prepare, FormulaRuntime, FormulaSource};
//!
//! let mut runtime = FormulaRuntime::new().unwrap();
//! let ctx = runtime.audio_mut();
//! let mut state = prepare(ctx, &FormulaSource::init());
//! let value = evaluate(ctx, 0, 0.25, &mut state);
//! assert!(state.is_valid);
//! assert!((value - (-0.5)).abs() < 1e-6);
//! ```

pub mod cache;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod protocol;
pub mod sandbox;
pub mod source;
pub mod state;

pub use context::{ContextKind, FormulaRuntime, InterpreterContext};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use engine::{cleanup, evaluate, prepare};
pub use protocol::ModParams;
pub use source::{content_hash, FormulaSource, DEFAULT_FORMULA};
pub use state::EvaluatorState;
