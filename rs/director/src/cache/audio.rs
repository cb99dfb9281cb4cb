use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use director_mux::{Chunk, Timestamp, catalog::AudioConfig};

use crate::decode::{Backend, Flushed, Session};

/// PCM for one channel of one decoded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
	pub data: Bytes,
	pub timestamp: Timestamp,
}

/// Every decoded block of an audio track, split by channel.
///
/// `channels[c][i]` is channel `c` of block `i`; every channel has the same number of blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlockSet {
	pub sample_rate: u32,
	pub channel_count: u32,

	/// Total sample frames per channel.
	pub length: usize,

	pub channels: Vec<Vec<AudioBlock>>,
}

impl AudioBlockSet {
	/// The number of blocks in each channel.
	pub fn blocks(&self) -> usize {
		self.channels.first().map(Vec::len).unwrap_or_default()
	}

	pub fn timestamp(&self, index: usize) -> Option<Timestamp> {
		Some(self.channels.first()?.get(index)?.timestamp)
	}

	/// Block `index` of every channel.
	pub fn block(&self, index: usize) -> Option<Vec<Bytes>> {
		self.channels
			.iter()
			.map(|channel| channel.get(index).map(|block| block.data.clone()))
			.collect()
	}

	pub fn duration(&self) -> Duration {
		match self.sample_rate {
			0 => Duration::ZERO,
			rate => Duration::from_secs_f64(self.length as f64 / rate as f64),
		}
	}
}

/// The decoded audio track of an asset.
///
/// Audio is small compared to video, so it's decoded in a single pass up front and kept
/// contiguously for the scheduler.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
	data: Option<Arc<AudioBlockSet>>,
}

impl AudioBuffer {
	pub fn empty() -> Self {
		Self::default()
	}

	pub async fn decode<B: Backend>(backend: &B, config: &AudioConfig, chunks: Vec<Chunk>) -> Self {
		if chunks.is_empty() {
			return Self::empty();
		}

		let mut session = match Session::open(backend.audio(), config) {
			Ok(session) => session,
			Err(err) => {
				tracing::warn!(%err, "failed to configure audio decoder");
				return Self::empty();
			}
		};

		let submitted = chunks.len();
		for chunk in chunks {
			session.submit(chunk);
		}

		let Flushed { outputs, errors } = session.finish().await;
		for err in errors {
			tracing::warn!(%err, "audio decode error");
		}

		let channel_count = config.channel_count.max(1);
		let mut set = AudioBlockSet {
			sample_rate: config.sample_rate,
			channel_count,
			length: 0,
			channels: vec![Vec::with_capacity(outputs.len()); channel_count as usize],
		};

		for output in outputs {
			let Ok(timestamp) = Timestamp::from_scale(output.timestamp, config.timescale) else {
				tracing::warn!(timestamp = output.timestamp, "invalid audio timestamp");
				continue;
			};

			for (index, channel) in set.channels.iter_mut().enumerate() {
				channel.push(AudioBlock {
					data: output.channels.get(index).cloned().unwrap_or_default(),
					timestamp,
				});
			}

			set.length += output.frames;
		}

		tracing::debug!(submitted, blocks = set.blocks(), length = set.length, "decoded audio");

		Self {
			data: Some(Arc::new(set)),
		}
	}

	/// The decoded audio, or [`None`] if the asset has none.
	pub fn data(&self) -> Option<Arc<AudioBlockSet>> {
		self.data.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decode::mock::{MockBackend, chunk};
	use director_mux::ChunkKind;

	fn chunks(count: u64) -> Vec<Chunk> {
		(0..count).map(|i| chunk(ChunkKind::Key, i * 960)).collect()
	}

	#[tokio::test]
	async fn flat_decode() {
		let backend = MockBackend::default();
		let audio = AudioBuffer::decode(&backend, &backend.audio_config(), chunks(50)).await;

		let data = audio.data().unwrap();
		assert_eq!(data.channel_count, 2);
		assert_eq!(data.channels.len(), 2);
		assert_eq!(data.blocks(), 50);
		assert_eq!(data.length, 50 * 960);
		assert_eq!(data.duration(), Duration::from_secs(1));
		assert_eq!(data.timestamp(10), Some(Timestamp::from_millis(200).unwrap()));
		assert_eq!(data.block(3).unwrap().len(), 2);
		assert!(data.block(50).is_none());

		// A single decoder for the whole track.
		assert_eq!(backend.stats().configured, 1);
		assert_eq!(backend.stats().closed, 1);
	}

	#[tokio::test]
	async fn missing_blocks() {
		let backend = MockBackend {
			fail_timestamps: vec![960 * 3],
			..Default::default()
		};
		let audio = AudioBuffer::decode(&backend, &backend.audio_config(), chunks(10)).await;

		let data = audio.data().unwrap();
		assert_eq!(data.blocks(), 9);
		assert_eq!(data.timestamp(3), Some(Timestamp::from_millis(80).unwrap()));
	}

	#[tokio::test]
	async fn no_audio() {
		let backend = MockBackend::default();
		let audio = AudioBuffer::decode(&backend, &backend.audio_config(), Vec::new()).await;
		assert!(audio.data().is_none());
		assert_eq!(backend.stats().configured, 0);
	}
}
