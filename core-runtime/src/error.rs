use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing setting; the message names the flag or env var to fix.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
