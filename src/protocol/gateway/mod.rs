//! Gateway API types for catalog pages.
//!
//! The gateway answers `deezer.page*` methods with an envelope holding an
//! error object and the results:
//!
//! ```json
//! {
//!     "error": [],
//!     "results": { "DATA": { ... } }
//! }
//! ```
//!
//! On failure the error object is a map instead of an empty list, and the
//! results are empty:
//!
//! ```json
//! {
//!     "error": { "DATA_ERROR": "song::getData" },
//!     "results": {}
//! }
//! ```
//!
//! The error object is decoded and checked before the results are, so an
//! unknown identifier surfaces as `NotFound` rather than as a decoding
//! failure.
//!
//! # Number Handling
//!
//! The gateway sends most numbers as strings. Fields are decoded with
//! `PickFirst` so that both representations are accepted.

pub mod page;
pub mod song;

pub use page::{AlbumPage, ArtistPage, PlaylistPage, TrackPage};
pub use song::Song;

use std::{collections::BTreeMap, convert::Infallible, fmt, ops::Deref, str::FromStr};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Defines a gateway API method identifier.
///
/// # Examples
///
/// ```rust
/// use dzdl::protocol::gateway::{Method, TrackPage};
///
/// assert_eq!(TrackPage::METHOD, "deezer.pageTrack");
/// ```
pub trait Method {
    /// The gateway API method name, in dot notation.
    const METHOD: &'static str;
}

/// Response envelope of a gateway method.
///
/// The raw results are left out of debug output: they carry track tokens
/// that only the typed pages redact.
#[derive(Clone, PartialEq, Deserialize)]
pub struct Response {
    /// API status information
    #[serde(default)]
    pub error: Errors,

    /// Method-specific results, decoded on demand
    #[serde(default)]
    pub results: serde_json::Value,
}

impl Response {
    /// Checks the error object and decodes the results.
    ///
    /// # Errors
    ///
    /// * `Error::not_found` when the gateway reports `DATA_ERROR`
    /// * `Error::invalid_argument` when the API token was rejected
    /// * `Error::unknown` for other reported errors
    /// * a decoding error when the results do not match `T`
    pub fn into_result<T>(self) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.error.check()?;
        serde_json::from_value(self.results).map_err(Into::into)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Error object of the gateway envelope.
///
/// Empty when the call succeeded, which the gateway encodes as `[]`.
#[derive(Clone, PartialEq, Eq, Deserialize, Debug)]
#[serde(untagged)]
pub enum Errors {
    Map(BTreeMap<String, serde_json::Value>),
    List(Vec<serde_json::Value>),
}

impl Errors {
    /// Error key for an identifier that does not exist.
    pub const DATA_ERROR: &'static str = "DATA_ERROR";

    /// Error key for a missing or invalid API token.
    pub const VALID_TOKEN_REQUIRED: &'static str = "VALID_TOKEN_REQUIRED";

    /// Error key for an expired API token.
    pub const GATEWAY_ERROR: &'static str = "GATEWAY_ERROR";

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(map) => map.is_empty(),
            Self::List(list) => list.is_empty(),
        }
    }

    /// Converts reported errors into a crate error.
    ///
    /// # Errors
    ///
    /// Returns the classified error when any is present.
    pub fn check(&self) -> Result<()> {
        match self {
            Self::Map(map) => {
                let Some((key, value)) = map.iter().next() else {
                    return Ok(());
                };

                let detail = value
                    .as_str()
                    .map_or_else(|| value.to_string(), ToString::to_string);

                match key.as_str() {
                    Self::DATA_ERROR => Err(Error::not_found(format!(
                        "no such resource ({detail})"
                    ))),
                    Self::VALID_TOKEN_REQUIRED | Self::GATEWAY_ERROR => Err(
                        Error::invalid_argument(format!("api token rejected: {detail}")),
                    ),
                    _ => Err(Error::unknown(format!("{key}: {detail}"))),
                }
            }
            Self::List(list) => match list.first() {
                None => Ok(()),
                Some(value) => Err(Error::unknown(value.to_string())),
            },
        }
    }
}

impl Default for Errors {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// List of items on a page, e.g. the songs of an album.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct Items<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for Items<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// String value that defaults to "UNKNOWN" when missing.
///
/// # Examples
///
/// ```rust
/// use dzdl::protocol::gateway::StringOrUnknown;
///
/// let unknown = StringOrUnknown::default();
/// assert_eq!(&*unknown, "UNKNOWN");
/// ```
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Debug, Hash)]
pub struct StringOrUnknown(pub String);

impl Deref for StringOrUnknown {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for StringOrUnknown {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl Default for StringOrUnknown {
    fn default() -> Self {
        Self(String::from("UNKNOWN"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_error_list_is_success() {
        let response: Response =
            serde_json::from_str(r#"{"error": [], "results": {"DATA": {}}}"#).unwrap();
        assert!(response.error.is_empty());
        assert!(response.error.check().is_ok());
    }

    #[test]
    fn data_error_is_not_found() {
        let response: Response = serde_json::from_str(
            r#"{"error": {"DATA_ERROR": "song::getData"}, "results": {}}"#,
        )
        .unwrap();

        let err = response.into_result::<TrackPage>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.to_string().contains("song::getData"));
    }

    #[test]
    fn rejected_token_is_invalid_argument() {
        let response: Response = serde_json::from_str(
            r#"{"error": {"VALID_TOKEN_REQUIRED": "Invalid CSRF token"}, "results": {}}"#,
        )
        .unwrap();

        let err = response.error.check().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn debug_output_hides_track_tokens() {
        let response: Response = serde_json::from_str(
            r#"{"error": [], "results": {"DATA": {"SNG_ID": "3135556", "TRACK_TOKEN": "AAAAsecret"}}}"#,
        )
        .unwrap();
        assert!(!format!("{response:?}").contains("AAAAsecret"));

        let page: TrackPage = response.into_result().unwrap();
        assert!(!format!("{page:#?}").contains("AAAAsecret"));
    }
}
