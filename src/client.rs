//! HTTP client for the answer service.
//!
//! The service exposes a single endpoint, `GET /chat/ragbot/?q=<question>`,
//! which answers with a JSON object. Successful responses carry a `reply`
//! (plus optional `sources_used` and `confidence`); failed responses may
//! carry a `reply` or an `error` describing what went wrong.
//!
//! [`AnswerService`] is the seam the chat widget talks to, so tests and
//! alternative transports can stand in for [`RagbotClient`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::error::Result;

/// Path of the question endpoint on the answer service.
pub const RAGBOT_PATH: &str = "/chat/ragbot/";

/// Message shown when a failed response carries no usable description.
pub const FALLBACK_ERROR: &str = "An error occurred.";

/// Outcome of a completed request to the answer service.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The service answered the question.
    Answer {
        /// Answer text, displayed as-is.
        reply: String,
        /// Number of retrieved sources backing the answer.
        sources_used: u64,
        /// Retrieval similarity score, when the service reports one.
        confidence: Option<f64>,
    },
    /// The service responded with a non-success status.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Human-readable message extracted from the body.
        message: String,
    },
}

/// Anything that can answer a question on behalf of the chat widget.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Ask a single question.
    ///
    /// Server-reported failures are returned as [`Reply::Rejected`];
    /// only transport-level failures are errors.
    async fn ask(&self, question: &str) -> Result<Reply>;
}

/// Build the request path (with query) for a question.
///
/// Every byte outside the unreserved set is percent-encoded, so spaces
/// become `%20` and `?` becomes `%3F`.
#[must_use]
pub fn request_path(question: &str) -> String {
    format!("{RAGBOT_PATH}?q={}", urlencoding::encode(question))
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
    reply: String,
    #[serde(default)]
    sources_used: Option<u64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> String {
        let non_empty = |s: &String| !s.is_empty();
        self.reply
            .filter(non_empty)
            .or_else(|| self.error.filter(non_empty))
            .unwrap_or_else(|| FALLBACK_ERROR.to_string())
    }
}

/// Turn a raw response into a [`Reply`].
///
/// A failed status never produces an error: an empty or malformed body
/// falls back to [`FALLBACK_ERROR`]. A successful status with a body that
/// does not decode is a [`crate::error::ClientError::Decode`].
pub fn interpret_response(status: StatusCode, body: &[u8]) -> Result<Reply> {
    if !status.is_success() {
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
        return Ok(Reply::Rejected {
            status: status.as_u16(),
            message: parsed.into_message(),
        });
    }

    let body: AnswerBody = serde_json::from_slice(body)?;
    Ok(Reply::Answer {
        reply: body.reply,
        sources_used: body.sources_used.unwrap_or(0),
        confidence: body.confidence,
    })
}

/// [`AnswerService`] backed by the HTTP endpoint.
#[derive(Debug, Clone)]
pub struct RagbotClient {
    base_url: Url,
    http: reqwest::Client,
}

impl RagbotClient {
    /// Create a client with no request timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Origin of the answer service (e.g. "http://127.0.0.1:8000")
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_timeout(base_url, None)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url,
            http: builder.build()?,
        })
    }

    /// Create a client from the `backend` configuration section.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::with_timeout(
            &config.base_url,
            config.timeout_secs.map(Duration::from_secs),
        )
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full URL for a question.
    pub fn request_url(&self, question: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{}", request_path(question)))?)
    }
}

#[async_trait]
impl AnswerService for RagbotClient {
    async fn ask(&self, question: &str) -> Result<Reply> {
        let url = self.request_url(question)?;

        debug!(name: "ragbot.request.sent", url = %url, "Sending question");

        // The endpoint has always been called with this header, body or not.
        let response = self
            .http
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        debug!(
            name: "ragbot.response.received",
            status = status.as_u16(),
            bytes = body.len(),
            "Answer service responded"
        );

        interpret_response(status, &body)
    }
}
