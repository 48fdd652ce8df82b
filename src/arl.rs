//! Session cookie of a logged-in account.
//!
//! The ARL is a long-lived cookie that the web player sets after login. It is
//! sent with every gateway request so that the catalog answers on behalf of
//! the account. dzdl never logs in itself: the ARL is taken from the secrets
//! file as-is.

use std::{fmt, ops::Deref, str::FromStr};

use serde::Deserialize;
use veil::Redact;

use crate::error::Error;

/// Validated ARL cookie value.
///
/// Redacted in debug output.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Redact, Deserialize)]
#[serde(try_from = "String")]
pub struct Arl(#[redact] String);

impl Arl {
    /// Length of a valid ARL in characters.
    const LENGTH: usize = 192;
}

impl FromStr for Arl {
    type Err = Error;

    /// Parses an ARL.
    ///
    /// # Errors
    ///
    /// Returns `Error::invalid_argument` if the value is not 192 characters
    /// long or contains characters that cannot appear in a cookie.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars = s.chars().count();
        if chars != Self::LENGTH {
            return Err(Error::invalid_argument(format!(
                "arl should be {} characters long but is {chars}",
                Self::LENGTH
            )));
        }

        if !s.chars().all(|chr| chr.is_ascii_alphanumeric()) {
            return Err(Error::invalid_argument("arl contains invalid characters"));
        }

        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for Arl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Deref for Arl {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Formats the raw cookie value.
///
/// Only use this to build the `Cookie` header; never log it.
impl fmt::Display for Arl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn accepts_192_alphanumerics() {
        let raw = "a1".repeat(96);
        let arl: Arl = raw.parse().unwrap();
        assert_eq!(arl.as_str(), raw);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = "abc".parse::<Arl>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn rejects_cookie_separators() {
        let raw = format!("{};", "a".repeat(191));
        assert!(raw.parse::<Arl>().is_err());
    }

    #[test]
    fn redacts_debug_output() {
        let raw = "z".repeat(192);
        let arl: Arl = raw.parse().unwrap();
        assert!(!format!("{arl:?}").contains(&raw));
    }
}
