//! Media negotiation types.
//!
//! This module handles media access requests and responses, including:
//! * Track source URLs
//! * Audio formats and encryption
//! * Validity windows
//! * Structured endpoint errors
//!
//! # Wire Format
//!
//! Request:
//! ```json
//! {
//!     "license_token": "secret",
//!     "media": [{
//!         "type": "FULL",
//!         "formats": [{
//!             "cipher": "BF_CBC_STRIPE",
//!             "format": "MP3_320"
//!         }]
//!     }],
//!     "track_tokens": ["token"]
//! }
//! ```
//!
//! Response:
//! ```json
//! {
//!     "data": [{
//!         "media": [{
//!             "media_type": "FULL",
//!             "cipher": {"type": "BF_CBC_STRIPE"},
//!             "format": "MP3_320",
//!             "sources": [{
//!                 "url": "https://...",
//!                 "provider": "cdn"
//!             }],
//!             "nbf": 1234567890,
//!             "exp": 1234599999
//!         }],
//!         "errors": [{"code": 2002, "message": "Invalid track token"}]
//!     }],
//!     "errors": [{"code": 1000, "message": "Invalid license token"}]
//! }
//! ```

use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, TimestampSeconds};
use url::Url;
use veil::Redact;

/// Media access request.
#[derive(Clone, Eq, PartialEq, Serialize, Redact, Hash)]
pub struct Request {
    /// License authentication token
    #[redact]
    pub license_token: String,
    /// Requested media formats
    pub media: Vec<Media>,
    /// Track-specific access tokens
    #[redact]
    pub track_tokens: Vec<String>,
}

/// Media format request.
///
/// Specifies the type of media (full/preview) and the format/encryption
/// combinations in order of preference.
#[derive(Clone, Default, Eq, PartialEq, Serialize, Debug, Hash)]
pub struct Media {
    /// Full track or preview clip
    #[serde(rename = "type")]
    pub typ: Type,

    /// Requested format and encryption combinations, most preferred first
    #[serde(rename = "formats")]
    pub cipher_formats: Vec<CipherFormat>,
}

/// Media content type.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
pub enum Type {
    /// Full-length track
    #[default]
    FULL,
    /// Preview clip (typically 30 seconds)
    PREVIEW,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Format and encryption combination.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
pub struct CipherFormat {
    /// Encryption method
    pub cipher: Cipher,
    /// Audio format
    pub format: Format,
}

/// Content encryption method.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
#[expect(non_camel_case_types)]
pub enum Cipher {
    /// Blowfish CBC with striping
    #[default]
    BF_CBC_STRIPE,
    /// No encryption
    NONE,
}

impl fmt::Display for Cipher {
    /// Formats the cipher type for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dzdl::protocol::media::Cipher;
    ///
    /// assert_eq!(Cipher::BF_CBC_STRIPE.to_string(), "BF_CBC_STRIPE");
    /// assert_eq!(Cipher::NONE.to_string(), "NONE");
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Audio format.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
#[expect(non_camel_case_types)]
pub enum Format {
    /// FLAC lossless
    FLAC,
    /// 64 kbps MP3
    MP3_64,
    /// 128 kbps MP3
    #[default]
    MP3_128,
    /// 320 kbps MP3
    MP3_320,
    /// Other or unknown MP3 bitrate
    MP3_MISC,
}

impl Format {
    /// File extension of the container this format is delivered in.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::FLAC => "flac",
            _ => "mp3",
        }
    }
}

impl fmt::Display for Format {
    /// Formats the audio format for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dzdl::protocol::media::Format;
    ///
    /// assert_eq!(Format::MP3_320.to_string(), "MP3_320");
    /// assert_eq!(Format::FLAC.to_string(), "FLAC");
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Media access response.
///
/// Errors can be reported for the whole request (top level) or per track
/// token (inside a data entry).
#[derive(Clone, Default, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Response {
    #[serde(default)]
    pub data: Vec<Data>,

    #[serde(default)]
    pub errors: Vec<Error>,
}

/// Result for a single track token.
#[derive(Clone, Default, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Data {
    #[serde(default)]
    pub media: Vec<Medium>,

    #[serde(default)]
    pub errors: Vec<Error>,
}

/// Media access error.
///
/// Represents an error reported by the media server, containing both an
/// error code and descriptive message.
///
/// # Examples
///
/// ```rust
/// use dzdl::protocol::media::Error;
///
/// let error = Error {
///     code: 2002,
///     message: "Invalid track token".to_string(),
/// };
///
/// assert_eq!(error.to_string(), "Invalid track token (2002)");
/// ```
#[derive(Clone, Eq, Default, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash)]
pub struct Error {
    /// Numeric error code
    pub code: i64,
    /// Human-readable error description
    #[serde(default)]
    pub message: String,
}

impl Error {
    /// Code reported at the top level for an invalid license token.
    pub const INVALID_LICENSE_TOKEN: i64 = 1000;

    /// Code reported per track for an invalid or expired track token.
    pub const INVALID_TRACK_TOKEN: i64 = 2002;
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

/// Media access details.
///
/// Contains all information needed to access a media file, including URLs,
/// format, and validity period.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Medium {
    /// Full track or preview
    #[serde(default)]
    pub media_type: Type,

    /// Encryption method
    #[serde(default)]
    pub cipher: CipherType,

    /// Audio format
    #[serde(default)]
    pub format: Format,

    /// Available download sources, preferred first
    #[serde(default)]
    pub sources: Vec<Source>,

    /// Start of validity period
    #[serde(rename = "nbf")]
    #[serde_as(as = "Option<TimestampSeconds<i64, Flexible>>")]
    pub not_before: Option<SystemTime>,

    /// End of validity period
    #[serde(rename = "exp")]
    #[serde_as(as = "Option<TimestampSeconds<i64, Flexible>>")]
    pub expiry: Option<SystemTime>,
}

/// Encryption method wrapper for media content.
///
/// # Wire Format
///
/// ```json
/// {
///     "type": "BF_CBC_STRIPE"
/// }
/// ```
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Debug, Hash,
)]
pub struct CipherType {
    #[serde(rename = "type")]
    pub typ: Cipher,
}

/// Media source information.
///
/// Contains the URL and provider for downloading media content.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Redact, Hash)]
pub struct Source {
    /// Download URL (redacted in debug output)
    #[redact]
    pub url: Url,

    /// Content provider name (e.g., "cdn")
    #[serde(default)]
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_request() {
        let request = Request {
            license_token: "license".to_string(),
            media: vec![Media {
                typ: Type::FULL,
                cipher_formats: vec![CipherFormat {
                    cipher: Cipher::BF_CBC_STRIPE,
                    format: Format::MP3_128,
                }],
            }],
            track_tokens: vec!["token".to_string()],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "license_token": "license",
                "media": [{
                    "type": "FULL",
                    "formats": [{"cipher": "BF_CBC_STRIPE", "format": "MP3_128"}]
                }],
                "track_tokens": ["token"]
            })
        );
    }

    #[test]
    fn decodes_medium_with_validity_window() {
        let response: Response = serde_json::from_str(
            r#"{
                "data": [{
                    "media": [{
                        "media_type": "FULL",
                        "cipher": {"type": "BF_CBC_STRIPE"},
                        "format": "FLAC",
                        "sources": [{"url": "https://cdn.example/a", "provider": "ak"}],
                        "nbf": 1700000000,
                        "exp": "1700003600"
                    }]
                }]
            }"#,
        )
        .unwrap();

        let medium = &response.data[0].media[0];
        assert_eq!(medium.format, Format::FLAC);
        assert_eq!(medium.cipher.typ, Cipher::BF_CBC_STRIPE);
        assert_eq!(medium.sources[0].url.as_str(), "https://cdn.example/a");
        assert!(medium.not_before.is_some());
        assert!(medium.expiry > medium.not_before);
        assert!(response.errors.is_empty());
    }

    #[test]
    fn decodes_errors_at_both_levels() {
        let response: Response = serde_json::from_str(
            r#"{
                "data": [{"errors": [{"code": 2002, "message": "Invalid track token"}]}],
                "errors": [{"code": 1000, "message": "Invalid license token"}]
            }"#,
        )
        .unwrap();

        assert_eq!(response.errors[0].code, Error::INVALID_LICENSE_TOKEN);
        assert_eq!(response.data[0].errors[0].code, Error::INVALID_TRACK_TOKEN);
        assert!(response.data[0].media.is_empty());
    }
}
