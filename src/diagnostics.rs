/// `diagnostics.rs` - structured evaluation faults
///
/// Every failure an evaluator state can hit is wrapped into a stable,
/// JSON-serializable diagnostic the host UI can surface without scraping
/// Rust logs. The per-state buffer keeps the newest `MAX_DIAGNOSTICS`
/// entries only.

use serde::{Deserialize, Serialize};

/// Most entries a state keeps; older ones are dropped first.
pub const MAX_DIAGNOSTICS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Script text failed to parse or its top level raised (compile time).
    CompileError,
    /// Script compiled but defined no `process` function.
    MissingEntryPoint,
    /// Two different formula texts hashed alike. Recoverable: warn + recompile.
    HashCollision,
    /// `process` raised at runtime.
    InvocationError,
    /// `process` returned something other than a number or table.
    MalformedResult,
    /// Returned table carried no numeric `output` field.
    MissingOutputField,
    /// Callable or state table missing from the interpreter context.
    ContextUnavailable,
}

impl DiagnosticKind {
    /// Whether this kind invalidates the state. Only a hash collision is
    /// survivable; the recompile that follows it decides the real outcome.
    pub fn is_fatal(self) -> bool {
        !matches!(self, DiagnosticKind::HashCollision)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Unix timestamp (seconds) of when the fault was recorded.
    pub timestamp: i64,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Append `diag`, keeping only the newest `MAX_DIAGNOSTICS` entries.
pub(crate) fn push_bounded(buf: &mut Vec<Diagnostic>, diag: Diagnostic) {
    buf.push(diag);
    if buf.len() > MAX_DIAGNOSTICS {
        let skip = buf.len() - MAX_DIAGNOSTICS;
        buf.drain(..skip);
    }
}
