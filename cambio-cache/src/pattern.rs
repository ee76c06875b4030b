//! Key folding and shell-style glob matching.

use glob::Pattern;
use sha2::{Digest, Sha256};

use cambio_types::CambioError;

/// Keys longer than this are stored under their SHA-256 digest.
pub const MAX_KEY_LEN: usize = 250;

/// Fold `key` to its stored form: trimmed, lower-cased, and hashed when long.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    let folded = key.trim().to_lowercase();
    if folded.chars().count() > MAX_KEY_LEN {
        format!("{:x}", Sha256::digest(folded.as_bytes()))
    } else {
        folded
    }
}

/// A compiled glob pattern over folded keys.
///
/// Supports `*`, `?`, and bracket classes (`[abc]`, `[a-z]`, `[!x]`).
#[derive(Debug, Clone)]
pub struct Glob {
    source: String,
    pattern: Pattern,
}

impl Glob {
    /// Compile `pattern`. The pattern is folded the same way keys are.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an unterminated bracket class.
    pub fn new(pattern: &str) -> Result<Self, CambioError> {
        let source = pattern.trim().to_lowercase();
        let compiled = Pattern::new(&collapse_stars(&source))
            .map_err(|e| CambioError::InvalidArg(format!("glob {pattern:?}: {e}")))?;
        Ok(Self {
            source,
            pattern: compiled,
        })
    }

    /// Whether `key` (already folded) matches.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.pattern.matches(key)
    }

    /// Folded pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

// Keys are flat, so `**` means the same as `*`; `glob` only accepts it as a
// whole path component.
fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c != '*' || !out.ends_with('*') {
            out.push(c);
        }
    }
    out
}
