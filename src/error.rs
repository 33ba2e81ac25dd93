use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no geocoding results for {query:?}")]
    NotFound { query: String },

    #[error("{service} returned status {status}")]
    Transport {
        service: &'static str,
        status: StatusCode,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Cancellation means a newer search took over; it is never a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
