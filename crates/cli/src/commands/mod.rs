//! Command implementations.
//!
//! Each command builds on one [`Marketplace`] opened from the environment
//! and prints its result as JSON.

pub mod catalog;
pub mod diagnostics;
pub mod session;

use std::sync::Arc;

use bazaar_client::session::SessionError;
use bazaar_client::{
    ApiError, ClientConfig, ConfigError, FileStorage, Marketplace, MemoryStorage, SessionStorage,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The result could not be written as JSON.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    /// An argument was rejected before any request was made.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Text to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Session(e) => e.user_message(),
            Self::Api(e) => e.user_message(),
            Self::Config(_) | Self::Output(_) | Self::InvalidArgument(_) => self.to_string(),
        }
    }
}

/// Load configuration and open the marketplace.
pub fn open() -> Result<Marketplace, CliError> {
    let config = ClientConfig::from_env()?;
    let market = Marketplace::new(&config, storage_for(&config))?;
    debug!(base_url = %config.base_url, "Marketplace client ready");
    Ok(market)
}

/// File storage at the configured path, or memory when there is none.
fn storage_for(config: &ClientConfig) -> Arc<dyn SessionStorage> {
    if let Some(path) = &config.session_file {
        debug!(path = %path.display(), "Using session file");
        Arc::new(FileStorage::new(path.clone()))
    } else {
        warn!("No session file configured; the session will not outlive this command");
        Arc::new(MemoryStorage::new())
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}
