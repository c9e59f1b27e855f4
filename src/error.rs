use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
