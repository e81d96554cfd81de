//! Error types for Eaders.
//!
//! Uses `thiserror` for structured error definitions, one enum per
//! concern. The CLI wraps these in `anyhow` at the top level.

use crate::store::Credits;
use thiserror::Error;

/// Error type for catalog access.
///
/// None of these reach the reader directly. `NotFound` reads as an absent
/// entity; the catalog facade logs the rest and answers from the fixture
/// set instead.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No external catalog endpoint configured
    #[error("Catalog endpoint not configured")]
    NotConfigured,

    /// HTTP request failed
    #[error("Catalog request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Catalog answered with a non-success status
    #[error("Catalog returned HTTP {status} for {path}")]
    ApiError { status: u16, path: String },

    /// Payload could not be decoded
    #[error("Failed to parse catalog payload: {0}")]
    ParseError(String),

    /// Entity does not exist in this source (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Endpoint URL could not be built
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for persisted client state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to read a slot
    #[error("Failed to read state: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to write a slot
    #[error("Failed to save state '{key}': {message}")]
    WriteFailure { key: String, message: String },

    /// Writing would exceed the storage quota
    #[error("Storage quota exceeded while saving '{key}' ({needed} of {limit} bytes)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    /// Value could not be serialized
    #[error("Failed to encode state: {0}")]
    EncodeError(#[from] serde_json::Error),

    /// Another session kept a claim for too long
    #[error("State '{0}' is busy in another session, try again")]
    Locked(String),
}

impl StoreError {
    /// True for failures the reader should be told about (the write was
    /// abandoned).
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            StoreError::WriteFailure { .. }
                | StoreError::QuotaExceeded { .. }
                | StoreError::Locked(_)
        )
    }
}

/// Error type for reader actions gated on identity or input.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Action needs a signed-in identity
    #[error("Please sign in first")]
    AuthRequired,

    /// Rating outside 1..=5
    #[error("Rating must be between 1 and 5 stars, got {0}")]
    InvalidScore(u8),

    /// Feedback with nothing but whitespace
    #[error("Please write your feedback before submitting")]
    EmptyFeedback,

    /// Underlying state write failed
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Error type for generative backend calls.
#[derive(Error, Debug)]
pub enum GenerativeError {
    /// No API key configured
    #[error("Generative backend not configured")]
    NotConfigured,

    /// HTTP request to API failed
    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Content-safety filter rejected the request or its output
    #[error("Blocked by safety filters: {0}")]
    SafetyBlocked(String),

    /// Model answered without the expected content
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

/// Error type for the colorization workflow.
#[derive(Error, Debug)]
pub enum ColorizeError {
    /// No identity signed in
    #[error("Please sign in to colorize pages")]
    AuthRequired,

    /// Balance below the colorization cost
    #[error("Insufficient credit: balance {balance}, cost {cost}")]
    InsufficientCredit { balance: Credits, cost: Credits },

    /// Same page is already being colorized
    #[error("Page {page} is already being colorized")]
    AlreadyInProgress { page: u32 },

    /// Original page could not be fetched
    #[error("Failed to fetch page image: {0}")]
    Fetch(String),

    /// Generative backend failed
    #[error("Colorization failed: {0}")]
    Upstream(#[from] GenerativeError),

    /// State could not be read or written before any credit was spent
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Credit was spent but the colorized page could not be cached
    #[error("Colorized page could not be saved: {0}")]
    CacheWrite(#[source] StoreError),
}

impl ColorizeError {
    /// True when the backend rejected the page for content-safety reasons.
    pub fn is_safety_blocked(&self) -> bool {
        matches!(
            self,
            ColorizeError::Upstream(GenerativeError::SafetyBlocked(_))
        )
    }
}

/// Error type for the image relay. Each variant maps to an HTTP status.
#[derive(Error, Debug)]
pub enum RelayError {
    /// No `url` query parameter
    #[error("Missing image URL")]
    MissingUrl,

    /// `url` is not an absolute http(s) URL
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    /// Upstream answered with a non-success status
    #[error("Failed to fetch image: {reason}")]
    Upstream { status: u16, reason: String },

    /// Upstream could not be reached or read
    #[error("Error proxying image")]
    Transport(#[from] reqwest::Error),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
