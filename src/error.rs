//! Error types for the chat client.

use thiserror::Error;

/// A request to the answer service that could not be completed.
///
/// The `Display` output is the description the conversation shows after
/// `"Network error: "`, so variants keep their text short and readable.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be sent, timed out, or the body could not be read.
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// A successful response carried a body that is not the expected JSON.
    #[error("invalid response from server ({0})")]
    Decode(#[from] serde_json::Error),

    /// The configured backend URL cannot be combined with the request path.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias for answer service calls.
pub type Result<T> = std::result::Result<T, ClientError>;
