//! Secret reference resolver.
//!
//! Credential-bearing values in `config.toml` (and the `auth import`
//! argument) can point outside the file:
//!
//! - `pass::path/in/store` runs `pass show path/in/store` and takes the first line
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is used as-is

/// Resolves a value that may contain a secret reference prefix.
///
/// Resolved values are trimmed; a reference that resolves to nothing is an
/// error so that a blank token never reaches the network.
pub fn resolve(value: &str) -> Result<String, String> {
    if let Some(path) = value.strip_prefix("pass::") {
        non_empty(resolve_pass(path)?, value)
    } else if let Some(var) = value.strip_prefix("env::") {
        non_empty(resolve_env(var)?, value)
    } else {
        Ok(value.to_string())
    }
}

/// Returns true if `value` is a `pass::` or `env::` reference.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("pass::") || value.starts_with("env::")
}

fn non_empty(resolved: String, reference: &str) -> Result<String, String> {
    let trimmed = resolved.trim();
    if trimmed.is_empty() {
        return Err(format!("`{}` resolved to an empty value", reference));
    }
    Ok(trimmed.to_string())
}

/// Runs `pass show <path>` and returns the first line of stdout.
fn resolve_pass(path: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {}` failed (exit {}): {}",
            path,
            output.status,
            stderr.trim()
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(|s| s.to_string())
        .ok_or_else(|| format!("`pass show {}` produced no output", path))
}

/// Reads an environment variable.
fn resolve_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(resolve("xoxb-plain").unwrap(), "xoxb-plain");
        assert_eq!(resolve("").unwrap(), "");
        assert!(!is_reference("xoxb-plain"));
        assert!(is_reference("env::X"));
        assert!(is_reference("pass::slack/bot"));
    }

    #[test]
    fn env_prefix_resolves_and_trims() {
        unsafe {
            std::env::set_var("_SHEETSYNC_TEST_SECRET", "  rt-value\n");
        }
        assert_eq!(resolve("env::_SHEETSYNC_TEST_SECRET").unwrap(), "rt-value");
        unsafe {
            std::env::remove_var("_SHEETSYNC_TEST_SECRET");
        }
    }

    #[test]
    fn env_prefix_empty_value_errors() {
        unsafe {
            std::env::set_var("_SHEETSYNC_TEST_EMPTY", "   ");
        }
        let err = resolve("env::_SHEETSYNC_TEST_EMPTY").unwrap_err();
        assert!(err.contains("empty"));
        unsafe {
            std::env::remove_var("_SHEETSYNC_TEST_EMPTY");
        }
    }

    #[test]
    fn env_prefix_missing_var_errors() {
        let err = resolve("env::_SHEETSYNC_NONEXISTENT_VAR_12345").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn pass_prefix_missing_entry_errors() {
        // Fails whether or not `pass` is installed.
        let result = resolve("pass::nonexistent/entry/that/should/not/exist/12345");
        assert!(result.is_err());
    }
}
