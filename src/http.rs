//! HTTP client with rate limiting and cookie management.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting for API calls
//! * Cookie management for the gateway session
//! * Consistent headers and connection settings
//!
//! # Rate Limiting
//!
//! API calls are limited to 50 per 5-second interval. Bursts up to that
//! limit are allowed; requests beyond it are delayed.
//!
//! Media streams and cover art bypass the limiter through
//! [`Client::unlimited`]: they are single large transfers, not API calls.
//!
//! # Timeouts
//!
//! No read timeout is set. A track may take arbitrarily long to arrive and
//! the caller's deadline governs how long a download may run. Only the
//! connection phase has its own timeout.
//!
//! # Example
//!
//! ```rust
//! use dzdl::http::Client;
//!
//! let client = Client::new(&config, cookie_jar)?;
//! let request = client.post(url, body);
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    cookie::CookieStore,
    header::{HeaderValue, ACCEPT_LANGUAGE},
    Body, Method, Url,
};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting and cookie support.
pub struct Client {
    /// Request client without rate limiting.
    ///
    /// Used for media streams and cover art.
    pub unlimited: reqwest::Client,

    /// Rate limiter for API calls.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window of the API rate limit.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum API calls per interval.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for a connection to be established.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client that sends the cookies in `cookie_jar`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new<C>(config: &Config, cookie_jar: C) -> Result<Self>
    where
        C: CookieStore + 'static,
    {
        // Not having `Accept-Language` set is non-fatal.
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(lang) = HeaderValue::from_str(&config.app_lang) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .cookie_provider(Arc::new(cookie_jar));

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        *request.body_mut() = Some(body.into());
        request
    }

    /// Builds a POST request.
    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails on the network.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
