//! # director-mux: progressive MP4 demuxing for playback
//!
//! `director-mux` turns an MP4 byte stream into what a frame-accurate player needs:
//! - **Catalog**: decoder configuration for the video and audio tracks.
//! - **Model**: timestamped coded chunks, grouped into keyframe groups for video.
//! - **Import**: a progressive [`import::Demuxer`] that never requires the whole file to be resident.
//!
//! The demuxer is fed from an [`import::Source`], which can be an HTTP body, a local file,
//! any [`tokio::io::AsyncRead`], or bytes already in memory.
mod error;

pub mod catalog;
pub mod import;
pub mod model;

pub use error::*;
pub use model::*;
