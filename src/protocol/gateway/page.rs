//! Catalog page results.
//!
//! Every page carries a `DATA` object describing the resource itself. Album
//! and playlist pages list their songs under `SONGS`, artist pages list the
//! artist's top songs under `TOP`:
//!
//! ```json
//! {
//!     "DATA": { "ALB_TITLE": "Discovery" },
//!     "SONGS": { "data": [{ "SNG_ID": "3135556", ... }] }
//! }
//! ```

use serde::Deserialize;

use super::{Items, Method, Song, StringOrUnknown};

/// Result of `deezer.pageTrack`.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct TrackPage {
    #[serde(rename = "DATA")]
    pub data: Song,
}

impl Method for TrackPage {
    const METHOD: &'static str = "deezer.pageTrack";
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize, Debug)]
pub struct AlbumData {
    #[serde(default, rename = "ALB_TITLE")]
    pub title: StringOrUnknown,

    #[serde(default, rename = "ART_NAME")]
    pub artist: StringOrUnknown,
}

/// Result of `deezer.pageAlbum`.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct AlbumPage {
    #[serde(default, rename = "DATA")]
    pub data: AlbumData,

    #[serde(default, rename = "SONGS")]
    pub songs: Items<Song>,
}

impl Method for AlbumPage {
    const METHOD: &'static str = "deezer.pageAlbum";
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize, Debug)]
pub struct PlaylistData {
    #[serde(default, rename = "TITLE")]
    pub title: StringOrUnknown,
}

/// Result of `deezer.pagePlaylist`.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct PlaylistPage {
    #[serde(default, rename = "DATA")]
    pub data: PlaylistData,

    #[serde(default, rename = "SONGS")]
    pub songs: Items<Song>,
}

impl Method for PlaylistPage {
    const METHOD: &'static str = "deezer.pagePlaylist";
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize, Debug)]
pub struct ArtistData {
    #[serde(default, rename = "ART_NAME")]
    pub name: StringOrUnknown,
}

/// Result of `deezer.pageArtist`.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct ArtistPage {
    #[serde(default, rename = "DATA")]
    pub data: ArtistData,

    /// The artist's top songs
    #[serde(default, rename = "TOP")]
    pub top: Items<Song>,
}

impl Method for ArtistPage {
    const METHOD: &'static str = "deezer.pageArtist";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_album_songs() {
        let page: AlbumPage = serde_json::from_str(
            r#"{
                "DATA": {"ALB_TITLE": "Discovery", "ART_NAME": "Daft Punk"},
                "SONGS": {"data": [
                    {"SNG_ID": "3135553", "SNG_TITLE": "One More Time", "TRACK_TOKEN": "a"},
                    {"SNG_ID": "3135556", "SNG_TITLE": "Harder, Better, Faster, Stronger", "TRACK_TOKEN": "b"}
                ]}
            }"#,
        )
        .unwrap();

        assert_eq!(&*page.data.title, "Discovery");
        assert_eq!(page.songs.data.len(), 2);
        assert_eq!(page.songs.data[1].id.to_string(), "3135556");
    }

    #[test]
    fn decodes_artist_top_songs() {
        let page: ArtistPage = serde_json::from_str(
            r#"{
                "DATA": {"ART_NAME": "Daft Punk"},
                "TOP": {"data": [{"SNG_ID": 3135556, "TRACK_TOKEN": "b"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(&*page.data.name, "Daft Punk");
        assert_eq!(page.top.data.len(), 1);
    }

    #[test]
    fn tolerates_missing_song_lists() {
        let page: PlaylistPage =
            serde_json::from_str(r#"{"DATA": {"TITLE": "Empty"}}"#).unwrap();
        assert!(page.songs.data.is_empty());
    }
}
