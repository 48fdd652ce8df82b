use std::{
    fmt,
    num::NonZeroI64,
    str::FromStr,
    time::{Duration, SystemTime},
};

use veil::Redact;

use crate::{
    error::{Error, Result},
    protocol::gateway::Song,
};

/// Catalog track identifier.
///
/// Positive for catalog tracks, negative for user uploads, never zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(NonZeroI64);

impl FromStr for TrackId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim().parse::<NonZeroI64>().map_err(|e| {
            Error::invalid_argument(format!("invalid track id \"{s}\": {e}"))
        })?;
        Ok(Self(id))
    }
}

impl From<NonZeroI64> for TrackId {
    fn from(id: NonZeroI64) -> Self {
        Self(id)
    }
}

impl TryFrom<i64> for TrackId {
    type Error = Error;

    fn try_from(id: i64) -> Result<Self> {
        NonZeroI64::new(id)
            .map(Self)
            .ok_or_else(|| Error::invalid_argument("track id cannot be zero"))
    }
}

impl From<TrackId> for i64 {
    fn from(id: TrackId) -> Self {
        id.0.get()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A track as returned by the metadata gateway.
///
/// The artist and title are for display only. The track token scopes one
/// media negotiation and is redacted in debug output.
#[derive(Clone, PartialEq, Eq, Redact)]
pub struct TrackDescriptor {
    pub id: TrackId,

    #[redact]
    pub track_token: String,

    /// When the track token stops being accepted, if the gateway said so.
    pub token_expiry: Option<SystemTime>,

    pub artist: String,
    pub title: String,
    pub version: String,

    /// Hash of the album cover picture on the image CDN.
    pub cover: String,

    pub duration: Duration,
}

impl TrackDescriptor {
    /// Title with the version appended, e.g. "Song (Live)".
    #[must_use]
    pub fn full_title(&self) -> String {
        if self.version.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.version)
        }
    }

    /// Whether the track token has expired at `now`.
    ///
    /// Tokens without a known expiry are assumed valid; the media endpoint
    /// has the final say.
    #[must_use]
    pub fn is_token_expired(&self, now: SystemTime) -> bool {
        self.token_expiry.is_some_and(|expiry| expiry <= now)
    }
}

impl From<Song> for TrackDescriptor {
    fn from(song: Song) -> Self {
        Self {
            id: song.id,
            track_token: song.track_token,
            token_expiry: song.track_token_expiry,
            artist: song.artist.0,
            title: song.title.0,
            version: song.version,
            cover: song.album_cover,
            duration: song.duration,
        }
    }
}

impl fmt::Display for TrackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: \"{} - {}\"", self.id, self.artist, self.full_title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TrackDescriptor {
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

    #[test]
    fn parses_track_ids() {
        assert_eq!("3135556".parse::<TrackId>().unwrap().to_string(), "3135556");
        assert_eq!("-42".parse::<TrackId>().unwrap().to_string(), "-42");
        assert!("0".parse::<TrackId>().is_err());
        assert!("abc".parse::<TrackId>().is_err());
    }

    #[test]
    fn appends_version_to_title() {
        let mut track = descriptor();
        assert_eq!(track.full_title(), "Harder, Better, Faster, Stronger");

        track.version = "(Live)".to_string();
        assert_eq!(track.full_title(), "Harder, Better, Faster, Stronger (Live)");
        assert_eq!(
            track.to_string(),
            "3135556: \"Daft Punk - Harder, Better, Faster, Stronger (Live)\""
        );
    }

    #[test]
    fn detects_expired_tokens() {
        let now = SystemTime::now();
        let mut track = descriptor();
        assert!(!track.is_token_expired(now));

        track.token_expiry = Some(now - Duration::from_secs(1));
        assert!(track.is_token_expired(now));

        track.token_expiry = Some(now + Duration::from_secs(60));
        assert!(!track.is_token_expired(now));
    }

    #[test]
    fn redacts_track_token() {
        let track = descriptor();
        assert!(!format!("{track:?}").contains("token\""));
    }
}
