//! Authentication commands.

use chrono::{DateTime, Utc};
use tracing::info;

use sheetsync_core::Redacted;
use sheetsync_providers::auth::{
    Credential, CredentialStore, HttpTokenEndpoint, TerminalPrompt, TokenBroker,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Runs the device-code flow and stores the resulting refresh token.
///
/// Without `force`, an already stored token is left alone.
pub async fn login(config: &ClientConfig, force: bool) -> ClientResult<()> {
    let store = config.credentials.open_store().map_err(ClientError::Config)?;

    if !force && store.load()?.is_some() {
        println!("A refresh token is already stored in {}.", store.describe());
        println!("Use --force to authorize again.");
        return Ok(());
    }

    let oauth = config.oauth.to_oauth_config().map_err(ClientError::Config)?;
    let scope = oauth.scope_param();
    let device_wait = oauth.device_wait;
    let prompt = TerminalPrompt::new(oauth.open_browser);
    let endpoint = HttpTokenEndpoint::new(oauth)
        .map_err(|e| ClientError::config(format!("failed to set up token endpoint: {}", e)))?;

    let mut broker = TokenBroker::new(&endpoint, store.as_ref(), &prompt, scope)
        .with_device_wait(device_wait);
    broker.bootstrap().await?;

    info!(store = %store.describe(), "device authorization completed");
    println!();
    println!("Authorization successful.");
    println!("The refresh token was saved to {}.", store.describe());
    Ok(())
}

/// Seeds the store with an existing refresh token.
pub fn import(config: &ClientConfig, secret_ref: &str) -> ClientResult<()> {
    let store = config.credentials.open_store().map_err(ClientError::Config)?;
    let credential = import_into(store.as_ref(), secret_ref, Utc::now())?;
    println!(
        "Imported refresh token {} into {}.",
        Redacted(&credential.refresh_token),
        store.describe()
    );
    Ok(())
}

/// Resolves `secret_ref` and saves it as the current refresh token.
pub fn import_into(
    store: &dyn CredentialStore,
    secret_ref: &str,
    now: DateTime<Utc>,
) -> ClientResult<Credential> {
    let token = secret::resolve(secret_ref)
        .map_err(|e| ClientError::config(format!("failed to resolve refresh token: {}", e)))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ClientError::config("refresh token is empty"));
    }
    let credential = Credential::new(token, now);
    store.save(&credential)?;
    Ok(credential)
}

/// Prints whether a refresh token is stored.
pub fn status(config: &ClientConfig) -> ClientResult<()> {
    let store = config.credentials.open_store().map_err(ClientError::Config)?;
    println!("{}", status_report(store.as_ref(), Utc::now())?);
    Ok(())
}

/// Describes the stored credential without revealing it.
pub fn status_report(store: &dyn CredentialStore, now: DateTime<Utc>) -> ClientResult<String> {
    let backend = format!("store:         {}", store.describe());
    let Some(credential) = store.load()? else {
        return Ok(format!(
            "{}\nrefresh token: not stored (run `sheetsync auth login`)",
            backend
        ));
    };
    Ok(format!(
        "{}\nrefresh token: {}\nupdated:       {} ({} ago)",
        backend,
        Redacted(&credential.refresh_token),
        credential.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format_age(now - credential.updated_at)
    ))
}

/// Removes the stored refresh token.
pub fn logout(config: &ClientConfig) -> ClientResult<()> {
    let store = config.credentials.open_store().map_err(ClientError::Config)?;
    store.clear()?;
    println!("Removed the refresh token from {}.", store.describe());
    Ok(())
}

fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes().max(0);
    match minutes {
        0 => "less than a minute".to_string(),
        m if m < 60 => format!("{}m", m),
        m if m < 60 * 24 => format!("{}h {}m", m / 60, m % 60),
        m => format!("{}d {}h", m / (60 * 24), (m / 60) % 24),
    }
}
