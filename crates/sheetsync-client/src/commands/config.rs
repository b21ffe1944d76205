//! Configuration commands.

use std::path::Path;

use sheetsync_core::redact;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Dump the current configuration to stdout, plain-text secrets redacted.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(&redacted(config))
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Returns a copy with inline secrets replaced by a fingerprint.
///
/// `env::` and `pass::` references are kept since they reveal nothing.
fn redacted(config: &ClientConfig) -> ClientConfig {
    let hide = |value: &mut Option<String>| {
        if let Some(v) = value.as_mut()
            && !secret::is_reference(v)
        {
            *v = redact(v);
        }
    };
    let mut config = config.clone();
    hide(&mut config.oauth.client_secret);
    hide(&mut config.slack.bot_token);
    config
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid.");
            Ok(())
        }
        Err(problems) => Err(ClientError::config(format!(
            "{} problem(s):\n  - {}",
            problems.len(),
            problems.join("\n  - ")
        ))),
    }
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_hides_inline_secrets_only() {
        let config = ClientConfig::parse(
            r#"
[oauth]
client_secret = "plain-client-secret-value"

[slack]
bot_token = "env::SLACK_BOT_TOKEN"
"#,
        )
        .unwrap();
        let shown = redacted(&config);
        let secret = shown.oauth.client_secret.unwrap();
        assert!(!secret.contains("client-secret-value"));
        assert!(secret.starts_with("plai"));
        assert_eq!(shown.slack.bot_token.as_deref(), Some("env::SLACK_BOT_TOKEN"));
    }

    #[test]
    fn validate_reports_problems() {
        let err = validate(&ClientConfig::default()).unwrap_err();
        assert!(err.to_string().contains("oauth.client_id"));
    }
}
