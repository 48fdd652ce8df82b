//! Wire types for the catalog services.
//!
//! # Submodules
//!
//! * [`gateway`] - Gateway API for track, album, playlist and artist pages
//! * [`media`] - Media negotiation for track sources
//!
//! Both APIs answer with JSON. Responses are decoded into typed structures,
//! including their error objects, so that failures are matched on explicit
//! fields and never on raw response text.

pub mod gateway;
pub mod media;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs JSON responses from the catalog APIs.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of API endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or its structure doesn't
/// match type `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
