//! Song entries as listed on gateway pages.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "SNG_ID": "3135556",
//!     "ART_NAME": "Daft Punk",
//!     "SNG_TITLE": "Harder, Better, Faster, Stronger",
//!     "VERSION": "",
//!     "ALB_PICTURE": "2e018122cb56986277102d2041a592c8",
//!     "DURATION": "224",
//!     "TRACK_TOKEN": "secret_token",
//!     "TRACK_TOKEN_EXPIRE": 1234567890
//! }
//! ```

use std::time::{Duration, SystemTime};

use serde::Deserialize;
use serde_with::{
    formats::Flexible, serde_as, DisplayFromStr, DurationSeconds, PickFirst, TimestampSeconds,
    TryFromInto,
};
use veil::Redact;

use crate::track::TrackId;

use super::StringOrUnknown;

#[serde_as]
#[derive(Clone, PartialEq, Eq, Deserialize, Redact)]
pub struct Song {
    #[serde(rename = "SNG_ID")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, TryFromInto<i64>)>")]
    pub id: TrackId,

    #[serde(default, rename = "ART_NAME")]
    pub artist: StringOrUnknown,

    #[serde(default, rename = "SNG_TITLE")]
    pub title: StringOrUnknown,

    #[serde(default, rename = "VERSION")]
    pub version: String,

    #[serde(default, rename = "ALB_PICTURE")]
    pub album_cover: String,

    #[serde(default, rename = "DURATION")]
    #[serde_as(as = "DurationSeconds<String, Flexible>")]
    pub duration: Duration,

    #[redact]
    #[serde(rename = "TRACK_TOKEN")]
    pub track_token: String,

    #[serde(rename = "TRACK_TOKEN_EXPIRE")]
    #[serde_as(as = "Option<TimestampSeconds<i64, Flexible>>")]
    pub track_token_expiry: Option<SystemTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_encoded_numbers() {
        let song: Song = serde_json::from_str(
            r#"{
                "SNG_ID": "3135556",
                "ART_NAME": "Daft Punk",
                "SNG_TITLE": "Harder, Better, Faster, Stronger",
                "VERSION": "",
                "ALB_PICTURE": "2e018122cb56986277102d2041a592c8",
                "DURATION": "224",
                "TRACK_TOKEN": "secret",
                "TRACK_TOKEN_EXPIRE": 1700000000
            }"#,
        )
        .unwrap();

        assert_eq!(song.id.to_string(), "3135556");
        assert_eq!(song.duration, Duration::from_secs(224));
        assert_eq!(&*song.artist, "Daft Punk");
        assert!(song.track_token_expiry.is_some());
    }

    #[test]
    fn defaults_missing_display_fields() {
        let song: Song =
            serde_json::from_str(r#"{"SNG_ID": 42, "TRACK_TOKEN": "secret"}"#).unwrap();

        assert_eq!(&*song.title, "UNKNOWN");
        assert!(song.version.is_empty());
        assert_eq!(song.duration, Duration::ZERO);
        assert!(song.track_token_expiry.is_none());
    }
}
