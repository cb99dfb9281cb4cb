use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use director_mux::{
	Chunk, ChunkKind, Group,
	catalog::{AudioCodec, AudioConfig, H264, VideoConfig},
};
use parking_lot::Mutex;

use super::{AudioData, Backend, DecodeError, Decoder, Flushed, Picture, Release};

#[derive(Debug, Clone, Default)]
pub struct Stats {
	pub configured: usize,
	pub closed: usize,
	pub frames: usize,
	pub released: HashMap<u64, usize>,
}

impl Stats {
	pub fn released(&self) -> usize {
		self.released.values().sum()
	}
}

/// Decodes every chunk into a frame identified by its timestamp.
#[derive(Clone, Default)]
pub struct MockBackend {
	pub fail_configure: bool,
	pub fail_timestamps: Vec<u64>,
	pub(crate) state: Arc<Mutex<Stats>>,
}

impl MockBackend {
	pub fn stats(&self) -> Stats {
		self.state.lock().clone()
	}

	pub fn config(&self) -> VideoConfig {
		VideoConfig {
			codec: H264 {
				profile: 0x42,
				constraints: 0xc0,
				level: 0x1e,
			}
			.into(),
			coded_width: 320,
			coded_height: 240,
			description: Bytes::from_static(&[1, 0x42, 0xc0, 0x1e, 0xff, 0xe0, 0]),
			timescale: 30_000,
			frame_duration: 1000,
			fps: 30,
		}
	}

	pub fn audio_config(&self) -> AudioConfig {
		AudioConfig {
			codec: AudioCodec::Opus,
			sample_rate: 48_000,
			channel_count: 2,
			timescale: 48_000,
			description: None,
		}
	}
}

#[derive(Debug, Clone)]
pub struct MockFrame {
	pub timestamp: u64,
	state: Arc<Mutex<Stats>>,
}

impl Release for MockFrame {
	fn release(self) {
		*self.state.lock().released.entry(self.timestamp).or_default() += 1;
	}
}

pub struct MockDecoder {
	backend: MockBackend,
	pending: Vec<u64>,
	errors: Vec<DecodeError>,
}

impl MockDecoder {
	fn new(backend: &MockBackend) -> Self {
		Self {
			backend: backend.clone(),
			pending: Vec::new(),
			errors: Vec::new(),
		}
	}

	fn open(&mut self) -> Result<(), DecodeError> {
		if self.backend.fail_configure {
			return Err(DecodeError::Configure("mock".to_string()));
		}

		self.backend.state.lock().configured += 1;
		Ok(())
	}

	fn push(&mut self, chunk: Chunk) {
		if self.backend.fail_timestamps.contains(&chunk.timestamp) {
			self.errors.push(DecodeError::Chunk {
				timestamp: chunk.timestamp,
				reason: "mock".to_string(),
			});
			return;
		}

		self.pending.push(chunk.timestamp);
	}

	// Outputs come back in presentation order, like a real decoder reordering B-frames.
	fn drain(&mut self) -> (Vec<u64>, Vec<DecodeError>) {
		let mut pending = std::mem::take(&mut self.pending);
		pending.sort();
		(pending, std::mem::take(&mut self.errors))
	}
}

impl Decoder for MockDecoder {
	type Config = VideoConfig;
	type Output = Picture<MockFrame>;

	fn configure(&mut self, _config: &VideoConfig) -> Result<(), DecodeError> {
		self.open()
	}

	fn decode(&mut self, chunk: Chunk) {
		self.push(chunk)
	}

	fn flush(&mut self) -> impl Future<Output = Flushed<Self::Output>> + Send {
		let (timestamps, errors) = self.drain();
		self.backend.state.lock().frames += timestamps.len();

		let outputs = timestamps
			.into_iter()
			.map(|timestamp| Picture {
				timestamp,
				frame: MockFrame {
					timestamp,
					state: self.backend.state.clone(),
				},
			})
			.collect();

		async move {
			tokio::task::yield_now().await;
			Flushed { outputs, errors }
		}
	}

	fn close(&mut self) {
		self.backend.state.lock().closed += 1;
	}
}

pub struct MockAudioDecoder(MockDecoder);

impl Decoder for MockAudioDecoder {
	type Config = AudioConfig;
	type Output = AudioData;

	fn configure(&mut self, _config: &AudioConfig) -> Result<(), DecodeError> {
		self.0.open()
	}

	fn decode(&mut self, chunk: Chunk) {
		self.0.push(chunk)
	}

	// Two channels of 960 silent f32 samples per chunk.
	fn flush(&mut self) -> impl Future<Output = Flushed<Self::Output>> + Send {
		let (timestamps, errors) = self.0.drain();

		let outputs = timestamps
			.into_iter()
			.map(|timestamp| AudioData {
				timestamp,
				frames: 960,
				channels: vec![Bytes::from(vec![0u8; 960 * 4]); 2],
			})
			.collect();

		std::future::ready(Flushed { outputs, errors })
	}

	fn close(&mut self) {
		Decoder::close(&mut self.0)
	}
}

impl Backend for MockBackend {
	type Frame = MockFrame;
	type Video = MockDecoder;
	type Audio = MockAudioDecoder;

	fn video(&self) -> MockDecoder {
		MockDecoder::new(self)
	}

	fn audio(&self) -> MockAudioDecoder {
		MockAudioDecoder(MockDecoder::new(self))
	}
}

pub fn chunk(kind: ChunkKind, timestamp: u64) -> Chunk {
	Chunk {
		kind,
		timestamp,
		duration: 1000,
		payload: Bytes::from_static(&[0, 0, 0, 1, 0x65]),
	}
}

/// `count` groups of `size` frames, 1000 ticks per frame.
pub fn groups(count: u64, size: u64) -> Vec<Group> {
	(0..count)
		.map(|g| {
			let chunks = (0..size)
				.map(|f| {
					let kind = if f == 0 { ChunkKind::Key } else { ChunkKind::Delta };
					chunk(kind, (g * size + f) * 1000)
				})
				.collect();
			Group::new(chunks).unwrap()
		})
		.collect()
}
