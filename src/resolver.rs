//! Media negotiation with quality fallback.
//!
//! The [`MediaResolver`] exchanges a track token for playable sources:
//!
//! 1. The requested [`QualityTier`] is checked against the account before
//!    anything is sent; free accounts may only request `Low`.
//! 2. A track token that is known to have expired is refused locally.
//! 3. One request lists the tier's format candidates, most preferred first.
//! 4. The response is decoded and classified on its error codes.
//!
//! The endpoint grants the best candidate it can serve. When that is not the
//! tier's first candidate, the [`Resolution`] carries a [`Fallback`] for the
//! caller to report. A fallback is not an error.
//!
//! Nothing is retried. Track tokens are single-use per negotiation: a caller
//! that wants to try again must get a fresh token from the metadata gateway.

use std::{fmt, sync::Arc, time::SystemTime};

use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    StatusCode, Url,
};
use time::OffsetDateTime;

use crate::{
    error::{Error, Result},
    protocol::{
        self,
        media::{self, Cipher, Format, Source},
    },
    quality::QualityTier,
    session::Session,
    track::TrackDescriptor,
};

/// Negotiated media for one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Format the endpoint granted
    pub format: Format,

    /// Tier the granted format belongs to
    pub quality: QualityTier,

    /// Encryption of the delivered stream
    pub cipher: Cipher,

    /// Candidate source URLs, preferred first
    pub sources: Vec<Source>,

    /// Start of the sources' validity window
    pub not_before: Option<SystemTime>,

    /// End of the sources' validity window
    pub expiry: Option<SystemTime>,
}

impl MediaDescriptor {
    /// Whether the sources may be fetched at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        self.not_before.is_none_or(|nbf| nbf <= now) && self.expiry.is_none_or(|exp| now < exp)
    }
}

impl From<media::Medium> for MediaDescriptor {
    fn from(medium: media::Medium) -> Self {
        Self {
            format: medium.format,
            quality: QualityTier::from(medium.format),
            cipher: medium.cipher.typ,
            sources: medium.sources,
            not_before: medium.not_before,
            expiry: medium.expiry,
        }
    }
}

/// The endpoint delivered a different format than the one asked for first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fallback {
    pub requested: Format,
    pub delivered: Format,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {} ({}) but got {} ({})",
            self.requested,
            QualityTier::from(self.requested),
            self.delivered,
            QualityTier::from(self.delivered)
        )
    }
}

/// Outcome of a successful negotiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub media: MediaDescriptor,
    pub fallback: Option<Fallback>,
}

/// Refuses premium tiers for free accounts.
///
/// # Errors
///
/// Returns `Error::quality_unavailable` if `quality` requires premium and
/// the account is not.
pub fn check_quality(quality: QualityTier, premium: bool) -> Result<()> {
    if quality.requires_premium() && !premium {
        return Err(Error::quality_unavailable(format!(
            "{quality} quality requires a premium account"
        )));
    }

    Ok(())
}

/// Refuses track tokens that are known to have expired.
///
/// # Errors
///
/// Returns `Error::invalid_track_token` if the token expired before `now`.
pub fn check_track_token(track: &TrackDescriptor, now: SystemTime) -> Result<()> {
    if track.is_token_expired(now) {
        let expiry = track.token_expiry.map(OffsetDateTime::from);
        return Err(Error::invalid_track_token(format!(
            "track token for {track} expired at {}",
            expiry.map_or_else(|| String::from("unknown"), |expiry| expiry.to_string())
        )));
    }

    Ok(())
}

/// Builds the negotiation request for one track.
#[must_use]
pub fn request(
    track: &TrackDescriptor,
    quality: QualityTier,
    license_token: &str,
) -> media::Request {
    media::Request {
        license_token: license_token.to_owned(),
        track_tokens: vec![track.track_token.clone()],
        media: vec![media::Media {
            typ: media::Type::FULL,
            cipher_formats: quality.candidates().to_vec(),
        }],
    }
}

/// Classifies a decoded negotiation response.
///
/// Only the first data entry and its first medium are used: one track token
/// is sent per request.
///
/// # Errors
///
/// * `Error::invalid_license_token` for code 1000 at the top level
/// * `Error::invalid_track_token` for code 2002 within the data entry
/// * `Error::remote_negotiation` for any other reported error
/// * `Error::no_sources_available` when no source was granted
pub fn classify(response: media::Response, requested: QualityTier) -> Result<Resolution> {
    if let Some(error) = response.errors.into_iter().next() {
        return Err(match error.code {
            media::Error::INVALID_LICENSE_TOKEN => Error::invalid_license_token(error),
            _ => Error::remote_negotiation(error),
        });
    }

    let data = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| Error::no_sources_available("no media data in response"))?;

    if let Some(error) = data.errors.into_iter().next() {
        return Err(match error.code {
            media::Error::INVALID_TRACK_TOKEN => Error::invalid_track_token(error),
            _ => Error::remote_negotiation(error),
        });
    }

    let medium = data
        .media
        .into_iter()
        .next()
        .ok_or_else(|| Error::no_sources_available("no media granted"))?;

    if medium.sources.is_empty() {
        return Err(Error::no_sources_available(format!(
            "no sources for {}",
            medium.format
        )));
    }

    let media = MediaDescriptor::from(medium);
    let preferred = requested.preferred();
    let fallback = (media.format != preferred).then_some(Fallback {
        requested: preferred,
        delivered: media.format,
    });

    Ok(Resolution { media, fallback })
}

/// Media negotiation client.
#[derive(Debug)]
pub struct MediaResolver {
    session: Arc<Session>,

    /// Negotiation endpoint.
    url: String,
}

impl MediaResolver {
    /// Production negotiation endpoint.
    pub const MEDIA_GET_URL: &'static str = "https://media.deezer.com/v1/get_url";

    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            url: Self::MEDIA_GET_URL.to_owned(),
        }
    }

    /// Sends negotiations to `url` instead of [`Self::MEDIA_GET_URL`].
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Negotiates sources for `track` in `quality`.
    ///
    /// Makes at most one network call and never retries.
    ///
    /// # Errors
    ///
    /// * `Error::quality_unavailable` before any network call, for premium
    ///   tiers on free accounts
    /// * `Error::invalid_track_token` before any network call, for expired
    ///   track tokens
    /// * the errors of [`classify`]
    /// * `Error::remote_negotiation` for unexpected HTTP statuses
    pub async fn resolve(
        &self,
        track: &TrackDescriptor,
        quality: QualityTier,
    ) -> Result<Resolution> {
        check_quality(quality, self.session.is_premium())?;
        check_track_token(track, SystemTime::now())?;

        let request = request(track, quality, self.session.license_token());
        trace!("{}: {request:#?}", self.url);

        let url = Url::parse(&self.url)?;
        let body = serde_json::to_vec(&request)?;

        let http = self.session.http();
        let mut request = http.post(url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = http.execute(request).await?;
        let status = response.status();

        // Errors are reported in the body of 400 responses as well.
        if status != StatusCode::OK && status != StatusCode::BAD_REQUEST {
            return Err(Error::remote_negotiation(format!(
                "media endpoint returned {status}"
            )));
        }

        let body = response.text().await?;
        let response: media::Response = protocol::json(&body, &self.url)?;

        let resolution = classify(response, quality)?;
        debug!(
            "track {}: {} {} with {} sources",
            track.id,
            resolution.media.cipher,
            resolution.media.format,
            resolution.media.sources.len()
        );

        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    fn track() -> TrackDescriptor {
        TrackDescriptor {
            id: "3135556".parse().unwrap(),
            track_token: "token".to_string(),
            token_expiry: None,
            artist: "Daft Punk".to_string(),
            title: "Harder, Better, Faster, Stronger".to_string(),
            version: String::new(),
            cover: String::new(),
            duration: Duration::from_secs(224),
        }
    }

    fn response(json: &str) -> media::Response {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn lossless_falls_back_to_standard() {
        let response = response(
            r#"{"data": [{"media": [{
                "media_type": "FULL",
                "cipher": {"type": "BF_CBC_STRIPE"},
                "format": "MP3_320",
                "sources": [{"url": "https://cdn.example/320", "provider": "ak"}]
            }]}]}"#,
        );

        let resolution = classify(response, QualityTier::Lossless).unwrap();
        assert_eq!(resolution.media.quality, QualityTier::Standard);
        assert_eq!(
            resolution.fallback,
            Some(Fallback {
                requested: Format::FLAC,
                delivered: Format::MP3_320,
            })
        );
    }

    #[test]
    fn granted_preferred_format_has_no_fallback() {
        let response = response(
            r#"{"data": [{"media": [{
                "cipher": {"type": "BF_CBC_STRIPE"},
                "format": "MP3_128",
                "sources": [{"url": "https://cdn.example/128"}]
            }]}]}"#,
        );

        let resolution = classify(response, QualityTier::Low).unwrap();
        assert_eq!(resolution.media.format, Format::MP3_128);
        assert!(resolution.fallback.is_none());
    }

    #[test]
    fn classifies_endpoint_errors() {
        let license = response(r#"{"errors": [{"code": 1000, "message": "Invalid license token"}]}"#);
        assert_eq!(
            classify(license, QualityTier::Low).unwrap_err().kind,
            ErrorKind::InvalidLicenseToken
        );

        let token = response(r#"{"data": [{"errors": [{"code": 2002, "message": "Invalid track token"}]}]}"#);
        assert_eq!(
            classify(token, QualityTier::Low).unwrap_err().kind,
            ErrorKind::InvalidTrackToken
        );

        let other = response(r#"{"data": [{"errors": [{"code": 2001, "message": "Track token has no sufficient rights"}]}]}"#);
        let err = classify(other, QualityTier::Low).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteNegotiation);
        assert!(err.to_string().contains("sufficient rights"));
    }

    #[test]
    fn empty_sources_are_unavailable() {
        let empty = response(r#"{"data": [{"media": [{"format": "MP3_128", "sources": []}]}]}"#);
        assert_eq!(
            classify(empty, QualityTier::Low).unwrap_err().kind,
            ErrorKind::NoSourcesAvailable
        );

        let no_media = response(r#"{"data": [{"media": []}]}"#);
        assert_eq!(
            classify(no_media, QualityTier::Low).unwrap_err().kind,
            ErrorKind::NoSourcesAvailable
        );
    }

    #[test]
    fn free_accounts_get_low_only() {
        assert!(check_quality(QualityTier::Low, false).is_ok());
        assert!(check_quality(QualityTier::Lossless, true).is_ok());
        assert_eq!(
            check_quality(QualityTier::Standard, false).unwrap_err().kind,
            ErrorKind::QualityUnavailable
        );
    }

    #[test]
    fn expired_track_token_is_refused() {
        let now = SystemTime::now();
        let mut track = track();
        assert!(check_track_token(&track, now).is_ok());

        track.token_expiry = Some(now - Duration::from_secs(60));
        assert_eq!(
            check_track_token(&track, now).unwrap_err().kind,
            ErrorKind::InvalidTrackToken
        );
    }

    #[test]
    fn request_lists_tier_candidates() {
        let request = request(&track(), QualityTier::Standard, "license");
        let formats: Vec<Format> = request.media[0]
            .cipher_formats
            .iter()
            .map(|candidate| candidate.format)
            .collect();
        assert_eq!(formats, [Format::MP3_320, Format::MP3_128]);
        assert_eq!(request.track_tokens, ["token"]);
    }

    #[test]
    fn validity_window() {
        let now = SystemTime::now();
        let mut media = MediaDescriptor {
            format: Format::MP3_128,
            quality: QualityTier::Low,
            cipher: Cipher::BF_CBC_STRIPE,
            sources: Vec::new(),
            not_before: None,
            expiry: None,
        };
        assert!(media.is_valid_at(now));

        media.not_before = Some(now + Duration::from_secs(60));
        assert!(!media.is_valid_at(now));

        media.not_before = Some(now - Duration::from_secs(60));
        media.expiry = Some(now);
        assert!(!media.is_valid_at(now));
    }
}
