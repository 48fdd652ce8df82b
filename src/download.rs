//! Download orchestration.
//!
//! A [`Downloader`] runs the pipeline for one track at a time:
//!
//! 1. Get the track descriptor and its token from the [`Metadata`] source
//! 2. Negotiate media through the [`MediaResolver`]
//! 3. Open the first responsive source within its validity window
//! 4. Derive the track key
//! 5. Decrypt the stream straight into the sink
//!
//! Every stage runs under a cancellation token and a deadline. When the
//! deadline passes, the token is cancelled and the pipeline stops at its
//! next check with `Cancelled`.
//!
//! The orchestrator never rolls back the sink. After a failure, whatever was
//! written is invalid and the caller must discard it.
//!
//! Cover art is fetched after the audio. A failure to get it is logged and
//! never fails the download.
//!
//! Independent pipelines may run concurrently. They share only the
//! read-only [`Session`].

use std::{
    collections::HashSet,
    future::Future,
    io,
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures_util::TryStreamExt;
use reqwest::Url;
use time::OffsetDateTime;
use tokio::io::AsyncWrite;
use tokio_util::{io::StreamReader, sync::CancellationToken};

use crate::{
    decrypt::{self, Progress, StreamDecryptor},
    error::{Error, ErrorKind, Result},
    gateway::{Metadata, Resource, ResourceKind},
    protocol::media::{Format, Source},
    quality::QualityTier,
    resolver::{Fallback, MediaDescriptor, MediaResolver},
    session::Session,
    track::{TrackDescriptor, TrackId},
};

/// Report of a completed download.
#[derive(Clone, Debug)]
pub struct Download {
    pub track: TrackDescriptor,

    /// Format that was delivered
    pub format: Format,

    /// Tier of the delivered format
    pub quality: QualityTier,

    /// Set when the delivered format was not the preferred one
    pub fallback: Option<Fallback>,

    /// Bytes and chunks written to the sink
    pub progress: Progress,

    /// Album cover as JPEG, if it could be fetched
    pub cover: Option<Vec<u8>>,
}

/// Image CDN that album covers are served from.
pub const COVER_BASE_URL: &str = "https://e-cdns-images.dzcdn.net/images/cover/";

/// Builds the URL of an album cover from its picture hash.
///
/// `base` must end with a slash. Returns `None` for tracks without a cover.
#[must_use]
pub fn cover_url(base: &str, picture: &str) -> Option<Url> {
    const COVER_SIZE: &str = "1000x1000-000000-80-0-0.jpg";

    if picture.is_empty() || !picture.chars().all(|chr| chr.is_ascii_alphanumeric()) {
        return None;
    }

    Url::parse(&format!("{base}{picture}/{COVER_SIZE}")).ok()
}

/// Selects the sources that may be tried at `now`, in order.
///
/// Sources outside the validity window of `media` and sources that are not
/// HTTP(S) are skipped with a warning.
#[must_use]
pub fn usable_sources(media: &MediaDescriptor, now: SystemTime) -> Vec<&Source> {
    if !media.is_valid_at(now) {
        let format = |time: Option<SystemTime>| {
            time.map_or_else(
                || String::from("unbounded"),
                |time| OffsetDateTime::from(time).to_string(),
            )
        };
        warn!(
            "sources are only valid from {} until {}",
            format(media.not_before),
            format(media.expiry)
        );
        return Vec::new();
    }

    media
        .sources
        .iter()
        .filter(|source| {
            // URLs can theoretically be non-HTTP, and only HTTP(S) is supported.
            let supported = matches!(source.url.scheme(), "http" | "https")
                && source.url.host_str().is_some();
            if !supported {
                warn!("skipping unsupported source from {}", source.provider);
            }
            supported
        })
        .collect()
}

/// Runs `future` unless `cancel` triggers first.
async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(Error::cancelled("download cancelled")),
        result = future => result,
    }
}

/// Runs `future` until it completes or `deadline` passes.
///
/// `child` must be the token that `future` observes. When the deadline
/// passes, it is cancelled and `future` runs to its next check. A
/// cancellation that `cancel` did not cause is reported as the deadline.
async fn within_deadline<F, T>(
    future: F,
    deadline: Duration,
    cancel: &CancellationToken,
    child: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::pin!(future);

    let result = tokio::select! {
        result = &mut future => result,
        () = tokio::time::sleep(deadline) => {
            child.cancel();
            future.await
        }
    };

    match result {
        Err(e) if e.kind == ErrorKind::Cancelled && !cancel.is_cancelled() => {
            Err(Error::cancelled(format!(
                "deadline of {}s expired",
                deadline.as_secs_f32()
            )))
        }
        result => result,
    }
}

/// Download pipeline over a metadata source.
pub struct Downloader<M> {
    session: Arc<Session>,
    metadata: M,
    resolver: MediaResolver,

    /// Image CDN base, ending with a slash.
    cover_base: String,
}

impl<M> Downloader<M>
where
    M: Metadata,
{
    #[must_use]
    pub fn new(session: Arc<Session>, metadata: M) -> Self {
        let resolver = MediaResolver::new(Arc::clone(&session));
        Self {
            session,
            metadata,
            resolver,
            cover_base: COVER_BASE_URL.to_owned(),
        }
    }

    /// Negotiates media with `url` instead of the production endpoint.
    #[must_use]
    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.resolver = self.resolver.with_url(url);
        self
    }

    /// Fetches covers below `base` instead of the production image CDN.
    #[must_use]
    pub fn with_cover_url(mut self, base: impl Into<String>) -> Self {
        self.cover_base = base.into();
        self
    }

    /// Resolves a resource to the tracks it contains.
    ///
    /// Every track is listed once, in the order of its first appearance, so
    /// that no two downloads share an identifier.
    ///
    /// # Errors
    ///
    /// Returns the errors of the metadata source.
    pub async fn tracks(&self, resource: Resource) -> Result<Vec<TrackDescriptor>> {
        let mut tracks = self.metadata.songs(resource).await?;

        let mut seen = HashSet::with_capacity(tracks.len());
        let listed = tracks.len();
        tracks.retain(|track| seen.insert(track.id));
        if tracks.len() < listed {
            debug!("{resource}: skipping {} duplicate tracks", listed - tracks.len());
        }

        Ok(tracks)
    }

    /// Downloads a track by identifier into `sink` within `deadline`.
    ///
    /// The metadata lookup counts towards the deadline.
    ///
    /// # Errors
    ///
    /// See [`Downloader::download`]. Additionally returns the errors of the
    /// metadata source.
    pub async fn run<W>(
        &self,
        id: TrackId,
        quality: QualityTier,
        deadline: Duration,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<Download>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let child = cancel.child_token();
        let pipeline = async {
            let track = self.track(id, &child).await?;
            self.pipeline(track, quality, sink, &child).await
        };

        within_deadline(pipeline, deadline, cancel, &child).await
    }

    /// Downloads a track into `sink` within `deadline`.
    ///
    /// # Errors
    ///
    /// * `Error::cancelled` when `cancel` triggers or the deadline passes
    /// * the errors of [`MediaResolver::resolve`]
    /// * `Error::no_sources_available` when no source could be opened
    /// * the errors of [`StreamDecryptor::process`]
    pub async fn download<W>(
        &self,
        track: TrackDescriptor,
        quality: QualityTier,
        deadline: Duration,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<Download>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let child = cancel.child_token();
        let pipeline = self.pipeline(track, quality, sink, &child);

        within_deadline(pipeline, deadline, cancel, &child).await
    }

    /// Looks up a single track.
    async fn track(&self, id: TrackId, cancel: &CancellationToken) -> Result<TrackDescriptor> {
        let resource = Resource {
            kind: ResourceKind::Track,
            id: id.into(),
        };

        cancellable(cancel, self.metadata.songs(resource))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("track {id} not found")))
    }

    async fn pipeline<W>(
        &self,
        track: TrackDescriptor,
        quality: QualityTier,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<Download>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let resolution = cancellable(cancel, self.resolver.resolve(&track, quality)).await?;
        if let Some(fallback) = resolution.fallback {
            info!("track {track}: {fallback}");
        }

        let media = resolution.media;
        let response = cancellable(cancel, self.open(&track, &media)).await?;

        let key = decrypt::derive(&**self.session.secret_key(), &track.id.to_string())?;
        let decryptor = StreamDecryptor::new(media.cipher, &key)?;

        let stream = response.bytes_stream().map_err(io::Error::other);
        let source = StreamReader::new(Box::pin(stream));

        let progress = decryptor.process(source, sink, cancel).await?;
        debug!(
            "track {track}: wrote {} bytes of {}",
            progress.bytes, media.format
        );

        let cover = match cancellable(cancel, self.cover(&track)).await {
            Ok(cover) => cover,
            Err(e) => {
                warn!("track {track}: failed to get cover: {e}");
                None
            }
        };

        Ok(Download {
            track,
            format: media.format,
            quality: media.quality,
            fallback: resolution.fallback,
            progress,
            cover,
        })
    }

    /// Opens the first responsive source.
    ///
    /// A source that fails is not tried again.
    async fn open(
        &self,
        track: &TrackDescriptor,
        media: &MediaDescriptor,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for source in usable_sources(media, SystemTime::now()) {
            let result = self
                .session
                .http()
                .unlimited
                .get(source.url.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);

            match result {
                Ok(response) => {
                    debug!(
                        "track {track}: streaming {} from {}",
                        media.format, source.provider
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let e = e.without_url();
                    warn!("track {track}: source from {} failed: {e}", source.provider);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => Error::no_sources_available(e),
            None => Error::no_sources_available(format!("no usable source for track {track}")),
        })
    }

    /// Fetches the album cover of `track`.
    async fn cover(&self, track: &TrackDescriptor) -> Result<Option<Vec<u8>>> {
        let Some(url) = cover_url(&self.cover_base, &track.cover) else {
            return Ok(None);
        };

        let response = self
            .session
            .http()
            .unlimited
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        trace!("track {track}: cover of {} bytes", bytes.len());
        Ok(Some(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::media::Cipher;

    fn media(urls: &[&str]) -> MediaDescriptor {
        MediaDescriptor {
            format: Format::MP3_128,
            quality: QualityTier::Low,
            cipher: Cipher::BF_CBC_STRIPE,
            sources: urls
                .iter()
                .map(|url| Source {
                    url: url.parse().unwrap(),
                    provider: String::from("cdn"),
                })
                .collect(),
            not_before: None,
            expiry: None,
        }
    }

    #[test]
    fn builds_cover_url() {
        let url = cover_url(COVER_BASE_URL, "2e018122cb56986277102d2041a592c8").unwrap();
        assert_eq!(
            url.as_str(),
            "https://e-cdns-images.dzcdn.net/images/cover/2e018122cb56986277102d2041a592c8/1000x1000-000000-80-0-0.jpg"
        );
        assert!(cover_url(COVER_BASE_URL, "").is_none());
        assert!(cover_url(COVER_BASE_URL, "../etc").is_none());
    }

    #[test]
    fn skips_non_http_sources() {
        let media = media(&["ftp://cdn.example/a", "https://cdn.example/b"]);
        let sources = usable_sources(&media, SystemTime::now());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url.as_str(), "https://cdn.example/b");
    }

    #[test]
    fn skips_sources_outside_window() {
        let now = SystemTime::now();
        let mut media = media(&["https://cdn.example/a"]);

        media.expiry = Some(now - Duration::from_secs(1));
        assert!(usable_sources(&media, now).is_empty());

        media.expiry = None;
        media.not_before = Some(now + Duration::from_secs(60));
        assert!(usable_sources(&media, now).is_empty());

        media.not_before = Some(now - Duration::from_secs(60));
        assert_eq!(usable_sources(&media, now).len(), 1);
    }

    #[tokio::test]
    async fn cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cancellable(&cancel, async { Ok(()) }).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn cancellable_passes_results_through() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
