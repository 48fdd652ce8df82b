//! Metadata collaborator for catalog resources.
//!
//! The download pipeline needs one thing from the catalog: the songs behind a
//! resource identifier, each with a track token for media negotiation. The
//! [`Metadata`] trait captures that contract; [`Gateway`] implements it on top
//! of the gateway API's `deezer.page*` methods.
//!
//! # Resources
//!
//! | Kind       | Method                | Songs              |
//! |------------|-----------------------|--------------------|
//! | `track`    | `deezer.pageTrack`    | the track itself   |
//! | `album`    | `deezer.pageAlbum`    | all album songs    |
//! | `playlist` | `deezer.pagePlaylist` | all playlist songs |
//! | `artist`   | `deezer.pageArtist`   | top songs, limited |
//!
//! Errors reported in the gateway envelope are decoded structurally, see
//! [`protocol::gateway::Errors`].

use std::{fmt, future::Future, sync::Arc};

use reqwest::{header::CONTENT_TYPE, Url};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{Error, Result},
    protocol::{
        self,
        gateway::{self, AlbumPage, ArtistPage, Method, PlaylistPage, Song, TrackPage},
    },
    session::Session,
    track::TrackDescriptor,
};

/// Kind of catalog resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl ResourceKind {
    /// Name of the identifier in the gateway payload.
    #[must_use]
    pub fn id_key(self) -> &'static str {
        match self {
            Self::Track => "sng_id",
            Self::Album => "alb_id",
            Self::Playlist => "playlist_id",
            Self::Artist => "art_id",
        }
    }

    /// Gateway method that returns this kind of page.
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::Track => TrackPage::METHOD,
            Self::Album => AlbumPage::METHOD,
            Self::Playlist => PlaylistPage::METHOD,
            Self::Artist => ArtistPage::METHOD,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Artist => "artist",
        };
        write!(f, "{name}")
    }
}

/// A catalog resource that resolves to songs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: i64,
}

impl Resource {
    /// Parses a resource from its kind and numeric identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::invalid_argument` if the identifier is not a non-zero
    /// integer.
    pub fn new(kind: ResourceKind, id: &str) -> Result<Self> {
        let id = id.trim().parse::<i64>()?;
        if id == 0 {
            return Err(Error::invalid_argument(format!("invalid {kind} id: 0")));
        }
        Ok(Self { kind, id })
    }

    /// Gateway payload requesting this resource's page.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut payload = json!({
            "nb": Gateway::PAGE_SIZE,
            "start": 0,
            "lang": "en",
            "tab": 0,
            "tags": true,
            "header": true,
        });
        payload[self.kind.id_key()] = json!(self.id.to_string());
        payload
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Source of track descriptors.
///
/// Implementations must tolerate concurrent use.
pub trait Metadata: Send + Sync {
    /// Resolves a resource to its songs.
    ///
    /// # Errors
    ///
    /// * `Error::not_found` if the resource does not exist or has no songs
    /// * `Error::invalid_argument` if the API token was rejected
    /// * any transport error
    fn songs(
        &self,
        resource: Resource,
    ) -> impl Future<Output = Result<Vec<TrackDescriptor>>> + Send;
}

/// Gateway API client.
#[derive(Debug)]
pub struct Gateway {
    session: Arc<Session>,

    /// Maximum number of top songs taken from an artist.
    limit: usize,
}

impl Gateway {
    const GATEWAY_URL: &'static str = "https://www.deezer.com/ajax/gw-light.php";
    const GATEWAY_INPUT: &'static str = "3";
    const GATEWAY_VERSION: &'static str = "1.0";

    /// Maximum number of songs requested per page.
    pub const PAGE_SIZE: usize = 10_000;

    /// Content type of the request body.
    const PLAIN_TEXT_CONTENT: &'static str = "text/plain;charset=UTF-8";

    #[must_use]
    pub fn new(session: Arc<Session>, limit: usize) -> Self {
        Self { session, limit }
    }

    /// Builds the URL for a gateway method.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built.
    pub fn url(method: &str, api_token: &str) -> Result<Url> {
        let url = Url::parse_with_params(
            Self::GATEWAY_URL,
            &[
                ("method", method),
                ("input", Self::GATEWAY_INPUT),
                ("api_version", Self::GATEWAY_VERSION),
                ("api_token", api_token),
            ],
        )?;
        Ok(url)
    }

    /// Calls a gateway method and decodes its results.
    async fn request<T>(&self, payload: &serde_json::Value) -> Result<T>
    where
        T: Method + for<'de> Deserialize<'de> + fmt::Debug,
    {
        // Check the URL early to not needlessly hit the rate limiter.
        let url = Self::url(T::METHOD, self.session.api_token())?;

        let http = self.session.http();
        let mut request = http.post(url, payload.to_string());
        request.headers_mut().insert(
            CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static(Self::PLAIN_TEXT_CONTENT),
        );

        let response = http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "{} returned {status}",
                T::METHOD
            )));
        }

        let body = response.text().await?;
        let page: T = protocol::json::<gateway::Response>(&body, T::METHOD)?.into_result()?;
        trace!("{}: {page:#?}", T::METHOD);

        Ok(page)
    }

    async fn page_songs(&self, resource: Resource) -> Result<(String, Vec<Song>)> {
        let payload = resource.payload();

        let page = match resource.kind {
            ResourceKind::Track => {
                let page: TrackPage = self.request(&payload).await?;
                (page.data.title.to_string(), vec![page.data])
            }
            ResourceKind::Album => {
                let page: AlbumPage = self.request(&payload).await?;
                (page.data.title.to_string(), page.songs.data)
            }
            ResourceKind::Playlist => {
                let page: PlaylistPage = self.request(&payload).await?;
                (page.data.title.to_string(), page.songs.data)
            }
            ResourceKind::Artist => {
                let page: ArtistPage = self.request(&payload).await?;
                let mut songs = page.top.data;
                songs.truncate(self.limit);
                (page.data.name.to_string(), songs)
            }
        };

        Ok(page)
    }
}

impl Metadata for Gateway {
    async fn songs(&self, resource: Resource) -> Result<Vec<TrackDescriptor>> {
        let (title, songs) = self.page_songs(resource).await?;
        if songs.is_empty() {
            return Err(Error::not_found(format!("{resource} has no songs")));
        }

        debug!("{resource}: \"{title}\" with {} songs", songs.len());
        Ok(songs.into_iter().map(TrackDescriptor::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_page_payload() {
        let resource = Resource::new(ResourceKind::Album, "302127").unwrap();
        let payload = resource.payload();
        assert_eq!(payload["alb_id"], "302127");
        assert_eq!(payload["nb"], 10_000);
        assert!(payload.get("sng_id").is_none());
    }

    #[test]
    fn builds_method_url() {
        let url = Gateway::url(ResourceKind::Playlist.method(), "token").unwrap();
        assert_eq!(url.host_str(), Some("www.deezer.com"));
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "method" && v == "deezer.pagePlaylist"));
        assert!(url.query_pairs().any(|(k, v)| k == "api_token" && v == "token"));
    }

    #[test]
    fn parses_resources() {
        assert!(Resource::new(ResourceKind::Track, "0").is_err());
        assert!(Resource::new(ResourceKind::Track, "abc").is_err());
        assert_eq!(
            Resource::new(ResourceKind::Track, "3135556").unwrap().to_string(),
            "track 3135556"
        );
    }
}
