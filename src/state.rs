/// `state.rs` - per-formula-instance evaluator state
///
/// One `EvaluatorState` per formula instance. `prepare` populates it,
/// every `evaluate` updates it, `cleanup` makes it inert. Hosts poll
/// `is_valid` / `last_error`, or drain `take_diagnostics` for a console.

use crate::context::ContextKind;
use crate::diagnostics::{self, Diagnostic, DiagnosticKind};
use crate::protocol::ModParams;

#[derive(Debug, Default)]
pub struct EvaluatorState {
    /// Context this state was prepared against. None until `prepare`.
    pub(crate) kind: Option<ContextKind>,
    /// Cache key of the resolved callable.
    pub(crate) callable: Option<u64>,
    /// Name of the persistent state global; None once cleaned up.
    pub(crate) state_name: Option<String>,
    /// False after any fatal fault; `evaluate` then returns 0.0 until the
    /// next `prepare`.
    pub is_valid: bool,
    /// Text of the most recent fault or warning.
    pub last_error: Option<String>,
    diagnostics: Vec<Diagnostic>,
    /// Host-refreshed inputs, bound into the state table on every call.
    pub params: ModParams,
    /// Script wants the host envelope applied (table protocol, default true).
    pub use_envelope: bool,
    /// One-shot retrigger requests from the last call.
    pub retrigger_aeg: bool,
    pub retrigger_feg: bool,
}

impl EvaluatorState {
    /// Fresh state bound to `kind`, with prepared parameter defaults
    /// (tempo 120, everything else zero, envelope on).
    pub(crate) fn prepared(kind: ContextKind) -> Self {
        Self {
            kind: Some(kind),
            is_valid: true,
            use_envelope: true,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> Option<ContextKind> {
        self.kind
    }

    /// Name of the persistent state global while the state is live.
    pub fn state_name(&self) -> Option<&str> {
        self.state_name.as_deref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain buffered diagnostics, oldest first.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Record a fault. Fatal kinds flip `is_valid`; the hash-collision
    /// warning leaves the state usable.
    pub(crate) fn record(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[formula] {message}");
        if kind.is_fatal() {
            self.is_valid = false;
        }
        self.last_error = Some(message.clone());
        diagnostics::push_bounded(&mut self.diagnostics, Diagnostic::new(kind, message));
    }
}
