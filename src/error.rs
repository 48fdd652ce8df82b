//! Error handling for dzdl.
//!
//! Every fallible operation returns an [`Error`] that pairs an [`ErrorKind`]
//! with the underlying error details. The kinds mirror the failure modes of
//! the download pipeline so that callers can tell an account problem from an
//! expired token or a network failure:
//!
//! * Key material: [`ErrorKind::InvalidKeyLength`]
//! * Account tier: [`ErrorKind::QualityUnavailable`]
//! * Media negotiation: [`ErrorKind::InvalidLicenseToken`],
//!   [`ErrorKind::InvalidTrackToken`], [`ErrorKind::NoSourcesAvailable`],
//!   [`ErrorKind::RemoteNegotiation`]
//! * Transfer: [`ErrorKind::Stream`], [`ErrorKind::Cancelled`]
//!
//! The remaining kinds cover configuration, metadata and sink failures.
//!
//! No error is retried inside the crate. Retry policy belongs to the caller.
//!
//! # Example
//!
//! ```rust
//! use dzdl::error::{Error, ErrorKind, Result};
//!
//! fn check(granted: bool) -> Result<()> {
//!     if !granted {
//!         return Err(Error::quality_unavailable("premium account required"));
//!     }
//!     Ok(())
//! }
//!
//! match check(false) {
//!     Err(e) if e.kind == ErrorKind::QualityUnavailable => {}
//!     _ => unreachable!(),
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Example
    /// ```
    /// use std::io;
    /// use dzdl::error::Error;
    ///
    /// let error = Error::from(io::Error::new(io::ErrorKind::Other, "oh no!"));
    /// assert!(error.downcast::<io::Error>().is_some());
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for dzdl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// Key material is not exactly 16 bytes.
    #[error("invalid key length")]
    InvalidKeyLength,

    /// A non-premium account requested a premium quality tier.
    #[error("quality unavailable")]
    QualityUnavailable,

    /// The media endpoint rejected the license token (code 1000).
    #[error("invalid license token")]
    InvalidLicenseToken,

    /// The media endpoint rejected the track token (code 2002), or the
    /// token expired before it was used.
    #[error("invalid track token")]
    InvalidTrackToken,

    /// The media endpoint granted no source for the track.
    #[error("no sources available")]
    NoSourcesAvailable,

    /// Any other failure reported by the media endpoint.
    #[error("remote negotiation error")]
    RemoteNegotiation,

    /// The source stream failed mid-transfer.
    #[error("stream error")]
    Stream,

    /// The caller cancelled the operation or its deadline expired.
    #[error("operation was cancelled")]
    Cancelled,

    #[error("invalid argument specified")]
    InvalidArgument,

    #[error("not found")]
    NotFound,

    #[error("service unavailable")]
    Unavailable,

    /// Writing to the sink failed.
    #[error("unrecoverable data loss or corruption")]
    DataLoss,

    #[error("internal error")]
    Internal,

    #[error("unknown error")]
    Unknown,
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dzdl::error::{Error, ErrorKind};
    ///
    /// let err = Error::new(ErrorKind::NotFound, "track not found");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for key material of the wrong length.
    pub fn invalid_key_length<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidKeyLength, error)
    }

    /// Creates an error for a quality tier the account may not use.
    ///
    /// Raised before any network call is made.
    pub fn quality_unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::QualityUnavailable, error)
    }

    /// Creates an error for a rejected license token.
    pub fn invalid_license_token<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidLicenseToken, error)
    }

    /// Creates an error for a rejected or expired track token.
    ///
    /// Track tokens are single-use per negotiation. A caller that wants to
    /// try again must fetch a fresh token from the metadata gateway.
    pub fn invalid_track_token<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidTrackToken, error)
    }

    /// Creates an error for a negotiation that granted no sources.
    pub fn no_sources_available<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NoSourcesAvailable, error)
    }

    /// Creates an error carrying a generic message from the media endpoint.
    pub fn remote_negotiation<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::RemoteNegotiation, error)
    }

    /// Creates an error for a failed read from the source stream.
    pub fn stream<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Stream, error)
    }

    /// Creates an error for cancelled operations.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dzdl::error::{Error, ErrorKind};
    ///
    /// let err = Error::cancelled("user cancelled download");
    /// assert_eq!(err.kind, ErrorKind::Cancelled);
    /// ```
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// Use when provided arguments or configuration values don't meet
    /// validation requirements.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for missing resources.
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for services that cannot be reached.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for data that could not be written to the sink.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for internal errors.
    ///
    /// Use for unexpected internal errors that shouldn't occur during normal
    /// operation.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for unclassified failures.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Formats the error for display.
///
/// Shows the kind followed by the underlying details:
/// `"invalid track token: token expired"`.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// Maps IO errors based on their kind:
/// * `NotFound` -> `NotFound`
/// * `InvalidInput` / `InvalidData` -> `InvalidArgument`
/// * `Interrupted` -> `Cancelled`
/// * Connection failures -> `Unavailable`
/// * Others -> `Unknown`
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            Interrupted => Self::cancelled(err),
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected
            | BrokenPipe | TimedOut | UnexpectedEof => Self::unavailable(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// Maps errors based on their type:
/// * Builder errors -> `Internal`
/// * Connection errors and timeouts -> `Unavailable`
/// * Body and decode failures -> `Stream`
/// * Status errors -> `RemoteNegotiation`
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_connect() || err.is_timeout() || err.is_redirect() {
            return Self::unavailable(err);
        }

        if err.is_body() || err.is_decode() {
            return Self::stream(err);
        }

        if err.is_status() {
            return Self::remote_negotiation(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors to `RemoteNegotiation`.
///
/// JSON is only ever decoded from remote responses, so a malformed document
/// is a remote failure.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::remote_negotiation(err)
    }
}

/// Converts URL parsing errors to `Internal`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts invalid header errors to `Internal`.
impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts TOML errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts integer parsing errors to `InvalidArgument`.
impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_kind_and_details() {
        let err = Error::invalid_track_token("token expired");
        assert_eq!(err.to_string(), "invalid track token: token expired");
    }

    #[test]
    fn maps_io_errors() {
        let err = Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "secrets.toml",
        ));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.downcast::<std::io::Error>().is_some());

        let err = Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }

    #[test]
    fn maps_parse_errors() {
        let err = Error::from("x".parse::<i64>().unwrap_err());
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
