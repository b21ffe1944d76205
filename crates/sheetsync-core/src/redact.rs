//! Masking of secrets before they reach logs or terminal output.

use std::fmt;

/// Number of leading characters shown for a redacted secret.
const VISIBLE_PREFIX: usize = 4;

/// Masks a secret, keeping a short prefix so that values can be told apart.
///
/// Secrets shorter than twice the visible prefix are fully hidden.
pub fn redact(secret: &str) -> String {
    Redacted(secret).to_string()
}

/// Display wrapper that prints a secret in redacted form.
///
/// Handy as a tracing field: `debug!(token = %Redacted(&token), ...)`.
#[derive(Clone, Copy)]
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.chars().count();
        if len == 0 {
            return f.write_str("<empty>");
        }
        if len < VISIBLE_PREFIX * 2 {
            return write!(f, "***(len {})", len);
        }
        let prefix: String = self.0.chars().take(VISIBLE_PREFIX).collect();
        write!(f, "{}…(len {})", prefix, len)
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
