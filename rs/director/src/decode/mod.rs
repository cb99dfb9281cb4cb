//! The boundary to an opaque decoding service.
//!
//! A [`Decoder`] is configured once, fed chunks in decode order, and flushed. Rather than
//! delivering output through a callback registered at configure time, [`Decoder::flush`]
//! resolves to every output in order, along with any errors raised along the way.
//!
//! Decoders are never shared between keyframe groups: the cache opens a fresh [`Session`]
//! per group, which guarantees the decoder is flushed and closed on every exit path.
use std::future::Future;

use bytes::Bytes;
use director_mux::{
	Chunk,
	catalog::{AudioConfig, VideoConfig},
};

mod session;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use session::*;

/// Errors reported by a decoder.
///
/// These are never fatal to playback: the affected frame is simply missing from the cache.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("failed to configure decoder: {0}")]
	Configure(String),

	#[error("failed to decode chunk at {timestamp}: {reason}")]
	Chunk { timestamp: u64, reason: String },

	#[error("unsupported: {0}")]
	Unsupported(String),
}

/// Everything a decoder produced between configure and flush.
#[derive(Debug)]
pub struct Flushed<T> {
	/// Outputs in presentation order.
	pub outputs: Vec<T>,

	/// The side channel: chunks that failed to decode.
	pub errors: Vec<DecodeError>,
}

impl<T> Default for Flushed<T> {
	fn default() -> Self {
		Self {
			outputs: Vec::new(),
			errors: Vec::new(),
		}
	}
}

pub trait Decoder: Send {
	type Config;
	type Output: Send;

	fn configure(&mut self, config: &Self::Config) -> Result<(), DecodeError>;

	/// Submit a chunk. Output may be buffered internally for reordering.
	fn decode(&mut self, chunk: Chunk);

	/// Resolves once every submitted chunk has produced its output.
	fn flush(&mut self) -> impl Future<Output = Flushed<Self::Output>> + Send;

	/// Release decoder-internal resources. The decoder isn't used afterwards.
	fn close(&mut self);
}

/// A scarce decoded resource that must be given back exactly once.
///
/// Clones are views of the same resource; only the owner releases it.
pub trait Release {
	fn release(self);
}

/// A decoded picture and the timestamp of the chunk that produced it, in track ticks.
#[derive(Debug, Clone)]
pub struct Picture<F> {
	pub timestamp: u64,
	pub frame: F,
}

/// Decoded PCM, one planar buffer per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
	/// The timestamp of the chunk that produced it, in track ticks.
	pub timestamp: u64,

	/// Number of sample frames in each channel.
	pub frames: usize,

	pub channels: Vec<Bytes>,
}

/// A factory for decoders, one backend per process or per asset.
pub trait Backend: Send + Sync + 'static {
	/// A decoded picture handle.
	type Frame: Release + Clone + Send + Sync + 'static;

	type Video: Decoder<Config = VideoConfig, Output = Picture<Self::Frame>> + 'static;
	type Audio: Decoder<Config = AudioConfig, Output = AudioData> + 'static;

	fn video(&self) -> Self::Video;
	fn audio(&self) -> Self::Audio;
}

#[cfg(test)]
pub(crate) mod mock;
