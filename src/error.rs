//! Error types used across the library.

use thiserror::Error;

use crate::event::EventKind;
use crate::model::Snowflake;

/// The error type returned by pretty much everything in the library.
///
/// Nothing in the ingestion path is fatal: a [`Decode`](ClientError::Decode)
/// error costs one event, a [`Frame`](ClientError::Frame) error one buffered
/// write. The connection only stops on [`WebSocket`](ClientError::WebSocket)
/// or [`ConnectionClosed`](ClientError::ConnectionClosed).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Transport-level trouble while asking for the gateway URL: DNS
    /// failures, TLS errors, timeouts, bad status codes.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid gateway URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Token is not a valid header value")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The gateway closed with a code that rules out reconnecting, such as
    /// 4004 (authentication failed).
    #[error("Gateway rejected the session with close code {0}")]
    SessionRejected(u16),

    /// Timeout waiting for `VOICE_SERVER_UPDATE`, a negotiation already in
    /// flight, etc.
    #[error("Voice error: {0}")]
    Voice(String),

    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Failed to decode {kind:?} payload: {source}")]
    Decode {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected writes into the segmented ring buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("write of {size} bytes does not fit a {capacity}-byte slice")]
    Oversized { size: usize, capacity: usize },

    #[error("slice already holds {limit} frames")]
    TooManyFrames { limit: usize },
}

/// Failures to cache a single element of a bulk payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("member of guild {guild_id} has no user object")]
    MissingUser { guild_id: Snowflake },
}

/// What a bus subscriber returns when it fails.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
