//! Read-only session credentials.
//!
//! A [`Session`] is built once from the configuration and then shared, for
//! example through an `Arc`, by every concurrent download. It exposes:
//! * the authenticated transport, with the `arl` cookie set
//! * the gateway API token
//! * the media license token
//! * whether the account is premium
//! * the secret that track keys are derived from
//!
//! Nothing in a session changes after construction. There is no login and no
//! token refresh: tokens that expire surface as errors to the caller.

use std::fmt;

use reqwest::Url;

use crate::{
    config::{Config, Credentials},
    decrypt::Key,
    error::Result,
    http,
};

pub struct Session {
    http_client: http::Client,
    api_token: String,
    license_token: String,

    premium: bool,

    secret_key: Key,
}

impl Session {
    /// Origin that the session cookies are scoped to.
    const COOKIE_ORIGIN: &'static str = "https://www.deezer.com";

    /// Creates a session from the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let Credentials {
            arl,
            secret_key,
            api_token,
            license_token,
            premium,
        } = config.credentials.clone();

        let cookie_jar = reqwest::cookie::Jar::default();
        let cookie_origin = Self::cookie_origin();

        let lang_cookie = format!(
            "dz_lang={}; Domain=deezer.com; Path=/; Secure; HttpOnly",
            &config.app_lang
        );
        cookie_jar.add_cookie_str(&lang_cookie, &cookie_origin);

        let arl_cookie = format!("arl={arl}; Domain=deezer.com; Path=/; Secure; HttpOnly");
        cookie_jar.add_cookie_str(&arl_cookie, &cookie_origin);

        let http_client = http::Client::new(config, cookie_jar)?;

        debug!(
            "session for {} account",
            if premium { "premium" } else { "free" }
        );

        Ok(Self {
            http_client,
            api_token,
            license_token,
            premium,
            secret_key,
        })
    }

    fn cookie_origin() -> Url {
        Url::parse(Self::COOKIE_ORIGIN).expect("invalid cookie origin")
    }

    /// Transport for API calls and media streams.
    #[must_use]
    pub fn http(&self) -> &http::Client {
        &self.http_client
    }

    #[must_use]
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    #[must_use]
    pub fn license_token(&self) -> &str {
        &self.license_token
    }

    /// Whether the account may request premium quality tiers.
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.premium
    }

    /// Secret that track keys are derived from.
    #[must_use]
    pub fn secret_key(&self) -> &Key {
        &self.secret_key
    }
}

/// Debug output without tokens or key material.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("premium", &self.premium)
            .finish_non_exhaustive()
    }
}
