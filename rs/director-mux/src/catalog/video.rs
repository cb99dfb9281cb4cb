use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, hex::Hex};

use super::VideoCodec;

/// Video decoder configuration, shaped like a WebCodecs VideoDecoderConfig.
///
/// Produced once per asset when the header is parsed and never mutated afterwards.
#[serde_with::serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
	#[serde_as(as = "DisplayFromStr")]
	pub codec: VideoCodec,

	pub coded_width: u32,
	pub coded_height: u32,

	/// The avcC record, byte-exact.
	#[serde_as(as = "Hex")]
	pub description: Bytes,

	/// Ticks per second of the track.
	pub timescale: u64,

	/// Nominal duration of a single frame in track ticks.
	pub frame_duration: u64,

	/// `timescale / frame_duration`, rounded.
	pub fps: u32,
}

impl VideoConfig {
	/// The exact native frame rate, ex. 29.97 for 30000/1001.
	pub fn frame_rate(&self) -> f64 {
		self.timescale as f64 / self.frame_duration.max(1) as f64
	}

	/// Map a chunk timestamp (in ticks) to the native frame index.
	///
	/// Rounds to the nearest frame, so a timestamp with a few ticks of jitter keeps its index.
	pub fn frame_index(&self, timestamp: u64) -> i64 {
		let duration = self.frame_duration.max(1);
		((timestamp + duration / 2) / duration) as i64
	}
}

/// Compute the nominal frame duration and rounded frame rate of a track.
///
/// The duration is the mean sample duration; it's at least one tick so it can be divided by.
pub fn frame_rate(timescale: u64, duration: u64, samples: u64) -> (u64, u32) {
	let frame_duration = match samples {
		0 => 1,
		samples => (duration / samples).max(1),
	};

	let fps = (timescale as f64 / frame_duration as f64).round() as u32;
	(frame_duration, fps)
}
