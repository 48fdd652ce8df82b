//! Configuration and credentials.
//!
//! [`Credentials`] are read from a small TOML secrets file:
//!
//! ```toml
//! arl = "..."
//! secret_key = "................"
//! api_token = "..."
//! license_token = "..."
//! premium = true
//! ```
//!
//! [`Config`] combines them with the application identity and the download
//! policy. Protocol constants such as the chunk size are not configurable.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use veil::Redact;

use crate::{
    arl::Arl,
    decrypt::Key,
    error::{Error, Result},
    quality::QualityTier,
};

/// Session credentials of a logged-in account.
///
/// All secrets are redacted in debug output.
#[derive(Clone, Redact, Deserialize)]
pub struct Credentials {
    /// Session cookie for the gateway
    pub arl: Arl,

    /// Secret that track keys are derived from
    ///
    /// Validated separately so that a bad key fails with its own kind.
    #[serde(skip_deserializing)]
    pub secret_key: Key,

    /// Gateway API token (`checkForm`)
    #[redact]
    pub api_token: String,

    /// Media license token
    #[redact]
    pub license_token: String,

    /// Whether the account may request premium quality tiers
    #[serde(default)]
    pub premium: bool,
}

impl Credentials {
    /// Largest secrets file that will be read.
    const MAX_FILE_SIZE: u64 = 1024;

    /// Loads credentials from a TOML file.
    ///
    /// # Errors
    ///
    /// * `Error::not_found` if the file does not exist
    /// * `Error::invalid_argument` if the file is too large or malformed
    /// * `Error::invalid_key_length` if the secret key is not 16 bytes
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: secrets file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        contents.parse()
    }
}

impl std::str::FromStr for Credentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let table = s.parse::<toml::Table>()?;

        let secret_key = table
            .get("secret_key")
            .ok_or_else(|| Error::invalid_argument("secrets do not contain a secret_key"))?
            .as_str()
            .ok_or_else(|| Error::invalid_argument("secret_key should be a string"))?
            .parse::<Key>()?;

        let mut credentials: Self = toml::Value::Table(table).try_into()?;
        credentials.secret_key = secret_key;
        Ok(credentials)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub app_lang: String,

    pub user_agent: String,

    pub credentials: Credentials,

    /// Quality to request for every track
    pub quality: QualityTier,

    /// Deadline for a single track download
    pub timeout: Duration,

    /// Maximum number of songs taken from an artist page
    pub limit: usize,

    /// Number of tracks downloaded concurrently
    pub jobs: usize,
}

impl Config {
    /// Default deadline for a single track.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default number of songs taken from an artist page.
    pub const DEFAULT_LIMIT: usize = 100;

    /// Creates a configuration with default policy.
    ///
    /// # Panics
    ///
    /// Panics when the application name, version or language, or the OS
    /// name or version, contain characters that are illegal in a
    /// `User-Agent` string.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        let app_name = env!("CARGO_PKG_NAME");
        let app_version = env!("CARGO_PKG_VERSION");
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            panic!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            );
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .map(|version| version.replace(illegal_chars, "_"))
            .unwrap_or_else(|| String::from("0"));

        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop; {app_lang})");
        trace!("user agent: {user_agent}");

        Self {
            app_lang,

            user_agent,

            credentials,

            quality: QualityTier::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            limit: Self::DEFAULT_LIMIT,
            jobs: 1,
        }
    }
}
