//! Track downloader with streaming stripe decryption.
//!
//! dzdl resolves catalog resources to tracks, negotiates a quality with the
//! media endpoint and decrypts the delivered stream chunk by chunk into any
//! `AsyncWrite` sink.
//!
//! # Pipeline
//!
//! * [`gateway`] - resolves tracks, albums, playlists and artists to songs
//! * [`resolver`] - negotiates sources with quality fallback
//! * [`decrypt`] - derives track keys and decrypts the stripe pattern
//! * [`download`] - runs the stages above under cancellation and a deadline
//!
//! # Support
//!
//! * [`config`] - configuration and credentials
//! * [`session`] - read-only credentials shared by concurrent downloads
//! * [`http`] - rate-limited HTTP client
//! * [`protocol`] - wire types
//! * [`error`] - error kinds for every failure mode

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod arl;
pub mod config;
pub mod decrypt;
pub mod download;
pub mod error;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod quality;
pub mod resolver;
pub mod session;
pub mod track;
