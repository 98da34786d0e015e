use thiserror::Error;

/// Failures starting a session or handling its configuration.
///
/// Request failures are not reported here: they reach callers as
/// [`RemoteError`](streamctl_types::RemoteError) through error handlers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("A session for {0} is already running")]
    AlreadyRunning(String),
}

pub type Result<T> = std::result::Result<T, Error>;
