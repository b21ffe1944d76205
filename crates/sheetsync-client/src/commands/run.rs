//! The `run` command: authenticate, then sync once.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use sheetsync_core::FetchWindow;
use sheetsync_providers::auth::{HttpTokenEndpoint, TerminalPrompt, TokenBroker};
use sheetsync_providers::drive::GraphDriveHost;
use sheetsync_providers::slack::SlackSource;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::runner::{self, RunOutcome, SyncSettings};

/// Options from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fetch records from this instant.
    pub since: Option<DateTime<Utc>>,
    /// Fetch records before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Merge and report without writing.
    pub dry_run: bool,
}

/// Picks the fetch window: explicit bounds win over the configured lookback.
pub fn fetch_window(
    options: &RunOptions,
    lookback_days: Option<u32>,
    now: DateTime<Utc>,
) -> ClientResult<FetchWindow> {
    let configured = match lookback_days {
        Some(days) => FetchWindow::lookback(now, Duration::days(i64::from(days))),
        None => FetchWindow::unbounded(),
    };
    FetchWindow::new(options.since.or(configured.start), options.until)
        .map_err(|e| ClientError::config(e.to_string()))
}

/// Runs one sync.
pub async fn run(config: &ClientConfig, options: RunOptions) -> ClientResult<()> {
    // Build every component before touching the network so that a bad
    // config fails fast.
    let oauth = config.oauth.to_oauth_config().map_err(ClientError::Config)?;
    let drive_config = config.drive.to_drive_config().map_err(ClientError::Config)?;
    let slack_config = config.slack.to_slack_config().map_err(ClientError::Config)?;
    let engine = config.sheet.to_engine().map_err(ClientError::Config)?;
    if config.slack.has_permalinks() && !engine.layout().schema.has_link_column() {
        warn!("no link column in sheet.columns, messages are deduplicated by text only");
    }
    let store = config.credentials.open_store().map_err(ClientError::Config)?;
    let settings = SyncSettings {
        file_path: config.drive.file_path.clone(),
        placeholder_sheet: config.drive.placeholder_sheet.clone(),
        window: fetch_window(&options, config.slack.lookback_days, Utc::now())?,
        dry_run: options.dry_run,
        backup_dir: config.backup.dir(),
    };
    debug!(?settings, "run settings");

    let scope = oauth.scope_param();
    let device_wait = oauth.device_wait;
    let allow_bootstrap = oauth.allow_bootstrap;
    let prompt = TerminalPrompt::new(oauth.open_browser);
    let endpoint = HttpTokenEndpoint::new(oauth)
        .map_err(|e| ClientError::config(format!("failed to set up token endpoint: {}", e)))?;
    let mut broker = TokenBroker::new(&endpoint, store.as_ref(), &prompt, scope)
        .with_device_wait(device_wait)
        .with_bootstrap(allow_bootstrap);
    let session = broker.acquire_access_token().await?;
    info!(path = ?broker.path(), "access token acquired");

    let host = GraphDriveHost::new(drive_config, session.access_token())
        .map_err(|e| ClientError::config(format!("failed to set up drive client: {}", e)))?;
    let source = SlackSource::new(slack_config)?;

    let report = runner::sync(&host, &source, &engine, &settings).await?;
    println!("{}", report);

    match report.outcome {
        RunOutcome::BackupWritten { path, error } => Err(ClientError::UploadFailed {
            path,
            message: error,
        }),
        _ => Ok(()),
    }
}
