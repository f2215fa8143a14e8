//! Defines the custom error types used throughout the `signage_display` application.
//!
//! This module centralizes error handling, providing specific error enums for
//! different categories of issues (configuration, backend API calls, media
//! processing, the on-disk display cache), and a top-level `AppError` to wrap
//! them. Each error type implements `Debug`, `Display`, and `std::error::Error`,
//! and provides `From` implementations for common underlying error types.

use std::error::Error as StdError;
use std::fmt;

// --- ConfigError ---
/// Errors related to application configuration loading and parsing.
#[must_use = "a configuration error should be handled or propagated"]
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O error occurred while trying to read the configuration file.
    Io(std::io::Error),
    /// An error occurred while parsing the configuration file content.
    Parse(String),
    /// A required configuration key was missing from the file.
    MissingKey(String),
    /// A key was present but its value is not acceptable.
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Configuration parse error: {}", e),
            ConfigError::MissingKey(key) => write!(f, "Missing configuration key: '{}'", key),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for configuration key '{}'", value, key)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

// --- ApiError ---
/// Errors returned by the display backend client.
#[must_use = "an API error should be handled or propagated"]
#[derive(Debug)]
pub enum ApiError {
    /// The backend could not be reached (offline, DNS, connection refused, timeout).
    Network(String),
    /// The backend answered with a non-2xx status.
    Http { status: u16, message: String },
    /// The payload carried an application-level `error` field.
    Application(String),
    /// The payload was not the JSON we expected.
    Decode(serde_json::Error),
    /// The configured base URL or an endpoint could not be parsed.
    UrlParse(url::ParseError),
}

impl ApiError {
    /// Network-class failures are the ones the refresh policy never retries
    /// immediately: the next scheduled poll is the retry.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Network(_) => FailureKind::Network,
            ApiError::Http { status, .. } => FailureKind::Http(*status),
            ApiError::Application(_) => FailureKind::Application,
            ApiError::Decode(_) | ApiError::UrlParse(_) => FailureKind::Decode,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, message } => write!(f, "HTTP error! status: {} ({})", status, message),
            ApiError::Application(msg) => write!(f, "{}", msg),
            ApiError::Decode(e) => write!(f, "API response decode error: {}", e),
            ApiError::UrlParse(e) => write!(f, "API URL parse error: {}", e),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Decode(e) => Some(e),
            ApiError::UrlParse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ApiError::Http { status: status.as_u16(), message: err.to_string() },
            None => ApiError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err)
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::UrlParse(err)
    }
}

/// Cloneable classification of a failed fetch, kept in published query state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Http(u16),
    Application,
    Decode,
}

/// A failed fetch as seen by consumers of a `QueryState`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ApiError> for FetchFailure {
    fn from(err: &ApiError) -> Self {
        FetchFailure { kind: err.kind(), message: err.to_string() }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// --- MediaError ---
/// Errors related to media processing (image downloads and decoding, video playback).
#[must_use = "a media error should be handled or propagated"]
#[derive(Debug)]
pub enum MediaError {
    /// An I/O error occurred, often related to temporary files for media.
    Io(std::io::Error),
    /// An error occurred during image processing via the `image` crate.
    Image(image::ImageError),
    /// An error occurred during video processing via `ffmpeg-next`.
    #[cfg(feature = "video")]
    Ffmpeg(ffmpeg_next::Error),
    /// An error occurred during the download of media content.
    Download(reqwest::Error),
    /// The media item has neither a usable `local_path` nor `url`.
    MissingSource(String),
    /// A generic media-related error.
    Generic(String),
    /// The format of the media is not supported.
    UnsupportedFormat(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::Io(e) => write!(f, "Media I/O error: {}", e),
            MediaError::Image(e) => write!(f, "Image processing error: {}", e),
            #[cfg(feature = "video")]
            MediaError::Ffmpeg(e) => write!(f, "FFmpeg error: {}", e),
            MediaError::Download(e) => write!(f, "Media download error: {}", e),
            MediaError::MissingSource(id) => write!(f, "Media item '{}' has no source URL", id),
            MediaError::Generic(s) => write!(f, "Media error: {}", s),
            MediaError::UnsupportedFormat(s) => write!(f, "Unsupported media format: {}", s),
        }
    }
}

impl StdError for MediaError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            MediaError::Io(e) => Some(e),
            MediaError::Image(e) => Some(e),
            #[cfg(feature = "video")]
            MediaError::Ffmpeg(e) => Some(e),
            MediaError::Download(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self { MediaError::Io(err) }
}
impl From<image::ImageError> for MediaError {
    fn from(err: image::ImageError) -> Self { MediaError::Image(err) }
}
#[cfg(feature = "video")]
impl From<ffmpeg_next::Error> for MediaError {
    fn from(err: ffmpeg_next::Error) -> Self { MediaError::Ffmpeg(err) }
}
impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self { MediaError::Download(err) }
}

// --- CacheError ---
/// Errors raised while reading or writing the on-disk display cache.
#[must_use = "a cache error should be handled or propagated"]
#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    /// The temporary file could not be renamed over the cache file.
    Persist(tempfile::PersistError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "Cache I/O error: {}", e),
            CacheError::Serde(e) => write!(f, "Cache (de)serialization error: {}", e),
            CacheError::Persist(e) => write!(f, "Cache persist error: {}", e),
        }
    }
}

impl StdError for CacheError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CacheError::Io(e) => Some(e),
            CacheError::Serde(e) => Some(e),
            CacheError::Persist(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self { CacheError::Io(err) }
}
impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self { CacheError::Serde(err) }
}
impl From<tempfile::PersistError> for CacheError {
    fn from(err: tempfile::PersistError) -> Self { CacheError::Persist(err) }
}

// --- AppError (Top-level error enum) ---
/// A top-level error type that can encompass any error within the application.
#[must_use = "an application error should be handled or propagated"]
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Api(ApiError),
    Media(MediaError),
    Cache(CacheError),
    Generic(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Application Configuration Error: {}", e),
            AppError::Api(e) => write!(f, "Application API Error: {}", e),
            AppError::Media(e) => write!(f, "Application Media Error: {}", e),
            AppError::Cache(e) => write!(f, "Application Cache Error: {}", e),
            AppError::Generic(s) => write!(f, "Application Error: {}", s),
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Api(e) => Some(e),
            AppError::Media(e) => Some(e),
            AppError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self { AppError::Config(err) }
}
impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self { AppError::Api(err) }
}
impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self { AppError::Media(err) }
}
impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self { AppError::Cache(err) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_classified() {
        let err = ApiError::Network("Failed to fetch".into());
        assert!(err.is_network());
        assert_eq!(err.kind(), FailureKind::Network);
        assert_eq!(err.to_string(), "Network error: Failed to fetch");
    }

    #[test]
    fn test_http_and_application_errors_are_not_network() {
        let http = ApiError::Http { status: 503, message: "unavailable".into() };
        assert!(!http.is_network());
        assert_eq!(http.kind(), FailureKind::Http(503));

        let app = ApiError::Application("Device not registered".into());
        assert!(!app.is_network());
        let failure = FetchFailure::from(&app);
        assert_eq!(failure.kind, FailureKind::Application);
        assert_eq!(failure.message, "Device not registered");
    }

    #[test]
    fn test_app_error_wraps_sources() {
        let err = AppError::from(ConfigError::MissingKey("api_base_url".into()));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("api_base_url"));
    }
}
