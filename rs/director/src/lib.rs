//! # director: frame-accurate playback of MP4 assets on a timeline
//!
//! `director` sits between a progressive demuxer ([`director_mux`]) and whatever draws
//! frames on screen. It decodes only what the playback cursor needs:
//! - **Decode**: the [`decode::Decoder`] boundary to an opaque codec, scoped per keyframe group.
//! - **Cache**: a windowed [`cache::FrameBuffer`] of decoded frames with explicit release.
//! - **Audio**: a [`audio::Scheduler`] that queues decoded audio against a playback clock.
//! - **Pipeline**: loading, coalesced buffering, and rendering of a [`pipeline::Movie`].
mod config;
mod error;
mod log;

pub mod audio;
pub mod cache;
pub mod decode;
pub mod pipeline;

pub use config::*;
pub use error::*;
pub use log::*;

// export the director-mux version in use
pub use director_mux;
