//! Track decryption for protected media content.
//!
//! This module turns the raw byte stream delivered by a media source into
//! playable audio:
//! * Derives a per-track key from the account-independent secret
//! * Reads the source in 2 KiB chunks as bytes arrive
//! * Decrypts the chunks that the stripe pattern marks as encrypted
//! * Writes every chunk, in order, to the sink
//!
//! # Encryption Format
//!
//! Protected tracks use a striped encryption pattern:
//! * Content is divided into 2 KiB chunks
//! * Every third chunk, starting with the first, is encrypted
//! * Encryption uses Blowfish in CBC mode
//! * The same fixed IV starts every encrypted chunk
//! * A chunk shorter than 2 KiB is never encrypted
//!
//! Only full chunks are eligible for decryption. A stream whose length is an
//! exact multiple of the chunk size still has its final chunk decrypted when
//! the chunk's position calls for it.
//!
//! # Security
//!
//! No decryption keys are included in this code. The secret must be provided
//! externally and is never persisted.
//!
//! # Memory
//!
//! At most one chunk is buffered at any time, regardless of track size.
//!
//! # Examples
//!
//! ```rust
//! use dzdl::decrypt::{Key, StreamDecryptor};
//! use dzdl::protocol::media::Cipher;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(source: &[u8]) -> dzdl::error::Result<()> {
//! let secret: Key = "abcdefghijklmnop".parse()?;
//! let key = dzdl::decrypt::derive(&*secret, "3135556")?;
//!
//! let mut sink = Vec::new();
//! let decryptor = StreamDecryptor::new(Cipher::BF_CBC_STRIPE, &key)?;
//! decryptor.process(source, &mut sink, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::{io, str::FromStr};

use blowfish::{cipher::BlockDecryptMut, cipher::KeyIvInit, Blowfish};
use cbc::cipher::block_padding::NoPadding;
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use veil::Redact;

use crate::{
    error::{Error, Result},
    protocol::media::Cipher,
};

/// Length of decryption keys in bytes.
pub const KEY_LENGTH: usize = 16;

/// Size of each chunk in bytes (2 KiB).
pub const CHUNK_SIZE: usize = 2 * 1024;

/// Fixed IV for CBC decryption.
///
/// Every encrypted chunk starts from this IV. It is not chained from the
/// previous chunk.
pub const CBC_BF_IV: &[u8; 8] = b"\x00\x01\x02\x03\x04\x05\x06\x07";

/// Number of chunks in a stripe.
///
/// The first chunk of every stripe is encrypted.
pub const CBC_STRIPE_COUNT: u64 = 3;

/// Blowfish block size in bytes.
const BLOWFISH_BLOCK_SIZE: usize = 8;

// Full chunks are decrypted without padding.
const _: () = assert!(CHUNK_SIZE % BLOWFISH_BLOCK_SIZE == 0);

/// Raw key bytes.
pub type RawKey = [u8; KEY_LENGTH];

/// Validated decryption key.
///
/// Used both for the secret supplied by configuration and for the per-track
/// keys derived from it. Redacted in debug output.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Redact)]
pub struct Key(#[redact] RawKey);

impl Key {
    /// Derives the track-specific key from this secret.
    ///
    /// The key is derived using:
    /// 1. MD5 hash of the track ID, rendered as 32 lowercase hex digits
    /// 2. XOR of the ASCII codes of both hex halves with the secret
    #[must_use]
    pub fn for_track(&self, track_id: &str) -> Key {
        let track_hash = format!("{:x}", Md5::digest(track_id));
        let track_hash = track_hash.as_bytes();

        let mut key = RawKey::default();
        for i in 0..KEY_LENGTH {
            key[i] = track_hash[i] ^ track_hash[i + KEY_LENGTH] ^ self.0[i];
        }
        Key(key)
    }
}

/// Derives a track key from raw secret bytes.
///
/// # Errors
///
/// Returns `Error::invalid_key_length` if `secret` is not exactly 16 bytes.
pub fn derive(secret: &[u8], track_id: &str) -> Result<Key> {
    Key::try_from(secret).map(|secret| secret.for_track(track_id))
}

impl TryFrom<&[u8]> for Key {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> std::result::Result<Self, Self::Error> {
        let key = RawKey::try_from(bytes).map_err(|_| {
            Error::invalid_key_length(format!(
                "key length is {} but should be {KEY_LENGTH}",
                bytes.len()
            ))
        })?;

        Ok(Self(key))
    }
}

impl FromStr for Key {
    type Err = Error;

    /// Parses a string into a decryption key.
    ///
    /// The string must be exactly 16 bytes long.
    ///
    /// # Errors
    ///
    /// Returns `Error::invalid_key_length` if the string length isn't
    /// exactly 16 bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dzdl::decrypt::Key;
    ///
    /// let key: Key = "1234567890123456".parse()?;
    /// assert!("12345".parse::<Key>().is_err());
    /// assert!("12345678901234567".parse::<Key>().is_err());
    /// # Ok::<(), dzdl::error::Error>(())
    /// ```
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::try_from(s.as_bytes())
    }
}

impl std::ops::Deref for Key {
    type Target = RawKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Counters reported after a stream has been fully processed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Progress {
    /// Bytes written to the sink
    pub bytes: u64,
    /// Chunks read from the source, including a short final chunk
    pub chunks: u64,
    /// Chunks that were decrypted
    pub decrypted: u64,
}

/// Streaming decryptor for protected tracks.
///
/// One decryptor handles exactly one track: [`StreamDecryptor::process`]
/// consumes it, so the chunk cursor always starts at zero.
#[derive(Debug)]
pub struct StreamDecryptor {
    /// Encryption method of the track.
    ///
    /// Either `NONE` for unencrypted tracks or `BF_CBC_STRIPE`.
    cipher: Cipher,

    /// Track-specific decryption key.
    key: Key,
}

impl StreamDecryptor {
    /// Creates a new decryptor for a track.
    ///
    /// # Errors
    ///
    /// Returns `Error::invalid_key_length` if the cipher cannot be initialized
    /// with `key`. This happens before any byte is read.
    pub fn new(cipher: Cipher, key: &Key) -> Result<Self> {
        Self::cipher_for(key)?;

        Ok(Self { cipher, key: *key })
    }

    /// Initializes a CBC decryptor at the start of a chunk.
    fn cipher_for(key: &Key) -> Result<cbc::Decryptor<Blowfish>> {
        cbc::Decryptor::<Blowfish>::new_from_slices(&**key, CBC_BF_IV)
            .map_err(|e| Error::invalid_key_length(e.to_string()))
    }

    /// Whether the chunk at `cursor` with `length` bytes must be decrypted.
    #[must_use]
    pub fn is_encrypted(&self, cursor: u64, length: usize) -> bool {
        self.cipher == Cipher::BF_CBC_STRIPE
            && length == CHUNK_SIZE
            && cursor % CBC_STRIPE_COUNT == 0
    }

    /// Reads from `source` until a full chunk is buffered or the source ends.
    ///
    /// Returns the number of bytes in `buffer`.
    async fn read_chunk<R>(source: &mut R, buffer: &mut [u8; CHUNK_SIZE]) -> Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            match source.read(&mut buffer[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::stream(e)),
            }
        }

        Ok(filled)
    }

    /// Decrypts `source` into `sink`, chunk by chunk.
    ///
    /// The source is consumed and dropped, which closes it, on every exit
    /// path. `cancel` is checked before each chunk and while waiting for
    /// bytes. On cancellation nothing more is written to the sink and the
    /// sink is not flushed.
    ///
    /// # Errors
    ///
    /// * `Error::stream` when reading from the source fails
    /// * `Error::cancelled` when `cancel` triggers
    /// * `Error::data_loss` when writing to the sink fails
    pub async fn process<R, W>(
        self,
        mut source: R,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<Progress>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut progress = Progress::default();
        let mut buffer = [0; CHUNK_SIZE];

        for cursor in 0.. {
            let length = tokio::select! {
                // Cancellation is polled before the next read is issued.
                biased;

                () = cancel.cancelled() => {
                    return Err(Error::cancelled(format!(
                        "download cancelled at chunk {cursor}"
                    )));
                }

                length = Self::read_chunk(&mut source, &mut buffer) => length?,
            };

            if length == 0 {
                break;
            }
            progress.chunks += 1;

            if self.is_encrypted(cursor, length) {
                // The state of the cipher is reset on each chunk.
                Self::cipher_for(&self.key)?
                    .decrypt_padded_mut::<NoPadding>(&mut buffer)
                    .map_err(|e| Error::internal(e.to_string()))?;
                progress.decrypted += 1;
            }

            sink.write_all(&buffer[..length])
                .await
                .map_err(Error::data_loss)?;
            progress.bytes += length as u64;

            if length < CHUNK_SIZE {
                break;
            }
        }

        drop(source);
        sink.flush().await.map_err(Error::data_loss)?;

        trace!(
            "processed {} bytes in {} chunks, {} decrypted",
            progress.bytes,
            progress.chunks,
            progress.decrypted
        );

        Ok(progress)
    }
}
