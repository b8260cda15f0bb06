/// `source.rs` - formula text plus its content hash
///
/// A `FormulaSource` is the immutable pairing of a user-authored script and
/// the 64-bit content hash the caches key on. Hosts persist the raw text
/// only; the hash is re-derived on load.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Out-of-box formula: a saw from -1 to 1 over one phase cycle.
pub const DEFAULT_FORMULA: &str = r#"function process(modstate)
    -- A formula must define a function called 'process'. It receives a
    -- table of inputs ('phase', 'deform', 'tempo', 'songpos' and friends),
    -- sets modstate.output to a number, and returns the table.

    modstate.output = modstate.phase * 2 - 1
    return modstate
end
"#;

/// First 8 bytes of the SHA-256 of `text`, as a big-endian u64.
pub fn content_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Script text + derived hash. Serializes as the bare text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FormulaSource {
    text: String,
    hash: u64,
}

impl FormulaSource {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self { text, hash }
    }

    /// Pair text with a caller-supplied hash instead of deriving one.
    /// Lets a host reuse a precomputed hash, and lets tests force two
    /// texts onto the same cache slot.
    pub fn with_hash(text: impl Into<String>, hash: u64) -> Self {
        Self { text: text.into(), hash }
    }

    /// The default saw formula.
    pub fn init() -> Self {
        Self::new(DEFAULT_FORMULA)
    }

    /// Replace the text and re-derive the hash.
    pub fn set_formula(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.hash = content_hash(&self.text);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl From<String> for FormulaSource {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<FormulaSource> for String {
    fn from(src: FormulaSource) -> Self {
        src.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_tracks_text() {
        let a = FormulaSource::new("return 1");
        let b = FormulaSource::new("return 2");
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), content_hash("return 1"));
    }

    #[test]
    fn set_formula_rehashes() {
        let mut src = FormulaSource::init();
        let old = src.hash();
        src.set_formula("function process(t) t.output = 0 return t end");
        assert_ne!(src.hash(), old);
        assert_eq!(src.hash(), content_hash(src.text()));
    }

    #[test]
    fn forced_hash_is_kept() {
        let src = FormulaSource::with_hash("anything", 42);
        assert_eq!(src.hash(), 42);
        assert_ne!(content_hash("anything"), 42);
    }

    #[test]
    fn serde_round_trip_rederives_hash() {
        let src = FormulaSource::with_hash("x = 1", 7);
        let json = serde_json::to_string(&src).unwrap();
        assert_eq!(json, "\"x = 1\"");
        let back: FormulaSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back.text(), "x = 1");
        assert_eq!(back.hash(), content_hash("x = 1"));
    }

    #[test]
    fn default_formula_defines_process() {
        assert!(DEFAULT_FORMULA.contains("function process"));
        assert_eq!(FormulaSource::init().text(), DEFAULT_FORMULA);
    }
}
