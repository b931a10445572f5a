//! Configuration management for the CLI.

use std::env;
use std::path::PathBuf;

/// CLI configuration loaded from environment variables, with platform
/// defaults for everything but the remote endpoint.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL for the local store.
    pub database_url: String,
    /// Where the session file (signed-in principal) lives.
    pub session_path: PathBuf,
    /// Remote store base URL; absent means in-process demo mode.
    pub remote_url: Option<String>,
    /// Principal override, bypassing the session file.
    pub principal_override: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = match env::var("JOT_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("jot"),
        };
        std::fs::create_dir_all(&data_dir)?;

        let db_path = env::var("JOT_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("notes.db"));

        Ok(Self {
            database_url: format!("sqlite://{}", db_path.display()),
            session_path: data_dir.join("session.json"),
            remote_url: env::var("JOT_REMOTE_URL").ok(),
            principal_override: env::var("JOT_PRINCIPAL").ok(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no platform data directory available; set JOT_DATA_DIR")]
    NoDataDir,

    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
}
