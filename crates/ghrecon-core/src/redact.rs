//! Hide-set driven login redaction.
//!
//! Logins subject to a GDPR hide request must never reach storage in
//! the clear. The hide-set is loaded once at startup; [`HideSet::maybe_hide`]
//! is a pure function applied at every point a login is persisted.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Set of logins that must be redacted before persistence.
#[derive(Debug, Default, Clone)]
pub struct HideSet {
    logins: HashSet<String>,
}

impl HideSet {
    /// Creates an empty hide-set (no login is redacted).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a hide-set from an explicit list of logins.
    pub fn new<I, S>(logins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            logins: logins.into_iter().map(Into::into).collect(),
        }
    }

    /// Loads a hide-set from a file with one login per line.
    ///
    /// Blank lines and lines starting with `#` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let logins = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToString::to_string)
            .collect();
        Ok(Self { logins })
    }

    /// Returns the number of hidden logins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logins.len()
    }

    /// Returns true when no login is hidden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logins.is_empty()
    }

    /// Redacts a login if it is in the hide-set, passes it through
    /// otherwise.
    ///
    /// The placeholder is stable per login: a hidden actor still
    /// aggregates consistently across rows.
    #[must_use]
    pub fn maybe_hide(&self, login: &str) -> String {
        if self.logins.contains(login) {
            anonymize(login)
        } else {
            login.to_string()
        }
    }
}

/// Stable placeholder for a hidden login: `anon-` + 16 hex chars of the
/// login's SHA-256 digest.
fn anonymize(login: &str) -> String {
    let digest = Sha256::digest(login.as_bytes());
    let mut out = String::with_capacity(21);
    out.push_str("anon-");
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
