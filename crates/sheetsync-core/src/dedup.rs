//! Deduplication keys.
//!
//! A row's key is its reference link when it has one, otherwise its message
//! text with whitespace collapsed. Keys for existing rows and for candidate
//! rows both go through [`DedupKey::from_cells`], and candidates are keyed
//! from their rendered row, so both sides see exactly the same cell text.

use std::fmt;

/// The value used to decide whether two rows describe the same message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    /// Keyed by the message's reference link.
    Ref(String),
    /// Keyed by normalized message text.
    Text(String),
}

impl DedupKey {
    /// Computes the key from a row's link and text cells.
    ///
    /// A blank link cell falls back to the text. Blank text still yields a
    /// key (the empty string) so that re-running over link-less empty
    /// messages stays idempotent.
    pub fn from_cells(link: Option<&str>, text: &str) -> Self {
        match link.map(str::trim).filter(|l| !l.is_empty()) {
            Some(link) => Self::Ref(link.to_string()),
            None => Self::Text(normalize_text(text)),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(r) => write!(f, "ref:{}", r),
            Self::Text(t) => write!(f, "text:{}", t),
        }
    }
}

/// Normalizes message text for keying.
///
/// Leading and trailing whitespace is removed and inner runs of whitespace
/// (including line breaks, which spreadsheet round trips may rewrite) collapse
/// to a single space. Case is preserved.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
