//! sheetsync CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use sheetsync_client::cli::{AuthAction, Cli, Command, ConfigAction};
use sheetsync_client::commands;
use sheetsync_client::commands::run::RunOptions;
use sheetsync_client::config::ClientConfig;
use sheetsync_client::error::{ClientError, ClientResult};
use sheetsync_core::{TracingConfig, init_tracing};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::for_cli(cli.debug, cli.log_format.into())) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    // An explicit path must exist; the default one may not.
    let (config, config_path) = match cli.config {
        Some(path) => (
            ClientConfig::load_from(&path).map_err(ClientError::Config)?,
            path,
        ),
        None => (
            ClientConfig::load().map_err(ClientError::Config)?,
            ClientConfig::default_path(),
        ),
    };

    match cli.command {
        Command::Run {
            since,
            until,
            dry_run,
        } => {
            let options = RunOptions {
                since,
                until,
                dry_run,
            };
            commands::run::run(&config, options).await
        }
        Command::Auth { action } => match action {
            AuthAction::Login { force } => commands::auth::login(&config, force).await,
            AuthAction::Import { secret_ref } => commands::auth::import(&config, &secret_ref),
            AuthAction::Status => commands::auth::status(&config),
            AuthAction::Logout => commands::auth::logout(&config),
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
