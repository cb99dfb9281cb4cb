use std::time::Duration;

use bytes::Bytes;
use director_mux::Timestamp;

/// One decoded block, ready to be started on the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
	/// The index of the block within its asset.
	pub index: usize,
	pub timestamp: Timestamp,
	pub sample_rate: u32,

	/// Planar PCM, one buffer per channel.
	pub channels: Vec<Bytes>,
}

/// An audio device with its own monotonic clock.
///
/// Starting a cue hands it to the device; the device plays it when its clock reaches `at`.
pub trait AudioOutput: Send + Sync + 'static {
	/// The current time of the device clock.
	fn now(&self) -> Duration;

	/// Play `cue` once the device clock reaches `at`.
	fn start(&self, cue: Cue, at: Duration);

	/// Stop everything started but not yet played.
	fn stop(&self) {}
}
