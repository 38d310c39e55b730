use std::{env, sync::Arc};

use colored::Colorize;
use jukebox_collab::{Collab, GoogleIdentity, PgDatabase, SharedDatabase, YouTubeResolver};
use jukebox_server::run_server;
use log::{error, info};
use thiserror::Error;
use tokio::runtime;

mod logging;

struct Config {
    database_url: String,
    google_client_id: String,
    youtube_api_key: String,
}

#[derive(Debug, Error)]
enum JukeboxError {
    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Could not initialize database: {0}")]
    Database(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Config {
    fn from_env() -> Result<Self, JukeboxError> {
        Ok(Self {
            database_url: require_env("DATABASE_URL")?,
            google_client_id: require_env("JUKEBOX_GOOGLE_CLIENT_ID")?,
            youtube_api_key: require_env("JUKEBOX_YOUTUBE_API_KEY")?,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, JukeboxError> {
    env::var(name).map_err(|_| JukeboxError::MissingEnv(name))
}

impl JukeboxError {
    fn hint(&self) -> String {
        match self {
            JukeboxError::MissingEnv(_) => "Jukebox is configured through environment variables. Set the missing one and try again.".to_string(),
            JukeboxError::Database(_) => "This is a database error. Make sure the PostgreSQL instance is reachable at DATABASE_URL, then try again.".to_string(),
            JukeboxError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn run() -> Result<(), JukeboxError> {
    let config = Config::from_env()?;

    info!("Building async runtime...");
    let main_runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("jukebox-async")
        .build()
        .map_err(|e| JukeboxError::Fatal(e.to_string()))?;

    main_runtime.block_on(async move {
        info!("Connecting to database...");
        let database: SharedDatabase = Arc::new(
            PgDatabase::new(&config.database_url)
                .await
                .map_err(|e| JukeboxError::Database(e.to_string()))?,
        );

        let identity = Arc::new(GoogleIdentity::new(config.google_client_id));
        let resolver = Arc::new(YouTubeResolver::new(config.youtube_api_key));

        let collab = Arc::new(Collab::new(database, identity, resolver));

        collab
            .restore()
            .await
            .map_err(|e| JukeboxError::Database(e.to_string()))?;

        info!("Initialized successfully.");
        run_server(collab).await;

        Ok(())
    })
}

fn main() {
    logging::init_logger();

    if let Err(error) = run() {
        error!(
            "{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.",
            "Jukebox failed to start!".bold().red()
        );
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).bright_black().italic());
    }
}
