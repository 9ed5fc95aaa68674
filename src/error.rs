//! Error type shared by the sessions, the generator facade and the experiments.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "visa")]
    #[error("VISA error: {0}")]
    Visa(#[from] visa_rs::Error),

    #[error("Instrument session is closed")]
    SessionClosed,

    #[error("Invalid {what}: {value:?}")]
    InvalidArgument { what: &'static str, value: String },

    #[error("No valid load specification")]
    InvalidLoad,

    #[error("Unexpected instrument response: {0:?}")]
    Response(String),

    #[error("Configuration validation error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Transport '{0}' is not available. Rebuild with --features {0}")]
    TransportDisabled(&'static str),
}

impl Error {
    pub(crate) fn invalid(what: &'static str, value: impl ToString) -> Self {
        Error::InvalidArgument {
            what,
            value: value.to_string(),
        }
    }
}
