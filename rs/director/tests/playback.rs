use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use director::audio::{AudioOutput, Cue};
use director::decode::{AudioData, DecodeError, Decoder, Flushed, Picture, Release};
use director::director_mux::catalog::{AudioConfig, VideoConfig};
use director::director_mux::import::fixture::{self, Fixture};
use director::director_mux::Chunk;
use director::pipeline::{Compositor, Content, Layout, Movie, Pipeline};
use director::{Config, Error};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Counters {
	decoded: usize,
	released: HashMap<u64, usize>,
	decoders: usize,
	closed: usize,
}

#[derive(Clone, Default)]
struct TestBackend {
	counters: Arc<Mutex<Counters>>,
}

#[derive(Clone, Debug)]
struct Frame {
	timestamp: u64,
	counters: Arc<Mutex<Counters>>,
}

impl Release for Frame {
	fn release(self) {
		*self.counters.lock().released.entry(self.timestamp).or_default() += 1;
	}
}

struct Video {
	counters: Arc<Mutex<Counters>>,
	pending: Vec<u64>,
}

impl Decoder for Video {
	type Config = VideoConfig;
	type Output = Picture<Frame>;

	fn configure(&mut self, config: &VideoConfig) -> Result<(), DecodeError> {
		assert_eq!(config.description.len(), 7 + 2 + fixture::SPS.len() + 2 + fixture::PPS.len());
		self.counters.lock().decoders += 1;
		Ok(())
	}

	fn decode(&mut self, chunk: Chunk) {
		self.pending.push(chunk.timestamp);
	}

	fn flush(&mut self) -> impl Future<Output = Flushed<Picture<Frame>>> + Send {
		let mut timestamps = std::mem::take(&mut self.pending);
		timestamps.sort();
		self.counters.lock().decoded += timestamps.len();

		let outputs = timestamps
			.into_iter()
			.map(|timestamp| Picture {
				timestamp,
				frame: Frame {
					timestamp,
					counters: self.counters.clone(),
				},
			})
			.collect();

		std::future::ready(Flushed { outputs, errors: Vec::new() })
	}

	fn close(&mut self) {
		self.counters.lock().closed += 1;
	}
}

#[derive(Default)]
struct Audio {
	pending: Vec<u64>,
}

impl Decoder for Audio {
	type Config = AudioConfig;
	type Output = AudioData;

	fn configure(&mut self, config: &AudioConfig) -> Result<(), DecodeError> {
		assert_eq!(config.sample_rate, fixture::AUDIO_TIMESCALE);
		Ok(())
	}

	fn decode(&mut self, chunk: Chunk) {
		self.pending.push(chunk.timestamp);
	}

	fn flush(&mut self) -> impl Future<Output = Flushed<AudioData>> + Send {
		let outputs = std::mem::take(&mut self.pending)
			.into_iter()
			.map(|timestamp| AudioData {
				timestamp,
				frames: fixture::AUDIO_DELTA as usize,
				channels: vec![Bytes::from(vec![0; fixture::AUDIO_DELTA as usize * 4]); 2],
			})
			.collect();

		std::future::ready(Flushed { outputs, errors: Vec::new() })
	}

	fn close(&mut self) {}
}

impl director::decode::Backend for TestBackend {
	type Frame = Frame;
	type Video = Video;
	type Audio = Audio;

	fn video(&self) -> Video {
		Video {
			counters: self.counters.clone(),
			pending: Vec::new(),
		}
	}

	fn audio(&self) -> Audio {
		Audio::default()
	}
}

// Records the picture shown by each layer on each frame.
#[derive(Default)]
struct Screen {
	shown: Arc<Mutex<Vec<(u64, String, u64)>>>,
}

impl Compositor<Frame> for Screen {
	type Surface = ();

	fn attach(&mut self, _surface: (), _width: u32, _height: u32, _background: u32) {}

	fn mount(&mut self, _id: &str, _layout: &Layout) {}

	fn unmount(&mut self, _id: &str) {}

	fn update(&mut self, id: &str, frame: u64, content: Content<'_, Frame>) {
		if let Content::Video(picture) = content {
			self.shown.lock().push((frame, id.to_string(), picture.timestamp));
		}
	}
}

#[derive(Default)]
struct Speaker {
	origin: Mutex<Option<tokio::time::Instant>>,
	cues: Mutex<Vec<(Cue, Duration)>>,
}

impl AudioOutput for Speaker {
	fn now(&self) -> Duration {
		self.origin.lock().get_or_insert_with(tokio::time::Instant::now).elapsed()
	}

	fn start(&self, cue: Cue, at: Duration) {
		self.cues.lock().push((cue, at));
	}
}

fn write(dir: &tempfile::TempDir, name: &str, data: Bytes) -> url::Url {
	let path = dir.path().join(name);
	std::fs::write(&path, data).unwrap();
	url::Url::from_file_path(path).unwrap()
}

#[tokio::test(start_paused = true)]
async fn playback() {
	director::Log::new(tracing::Level::DEBUG).init();

	let dir = tempfile::tempdir().unwrap();
	let clip = write(&dir, "clip.mp4", Fixture::default().encode());

	// Played at 60 fps: every native frame is shown twice.
	let movie = Movie::from_json(&format!(
		r#"{{
			"fps": 60, "width": 320, "height": 240,
			"objects": [
				{{ "type": "video", "id": "clip", "start": 0, "duration": 60, "src": "{clip}" }},
				{{ "type": "text", "id": "title", "start": 0, "duration": 60, "text": "director",
				   "font": {{ "size": 24, "color": "white", "family": "sans" }} }}
			]
		}}"#
	))
	.unwrap();

	let backend = TestBackend::default();
	let counters = backend.counters.clone();

	let screen = Screen::default();
	let shown = screen.shown.clone();

	let mut config = Config::default();
	config.cache.lookback = 0;
	config.cache.lookahead = 5;

	let pipeline = Pipeline::new(movie, config, backend, screen, Speaker::default());
	pipeline.load().await.unwrap();
	pipeline.attach(()).unwrap();

	for frame in 0..60 {
		pipeline.buffer(frame).await.unwrap();
		pipeline.render(frame).await.unwrap();
	}

	let shown = shown.lock().clone();
	assert_eq!(shown.len(), 60);
	for (frame, id, timestamp) in shown {
		assert_eq!(id, "clip");
		assert_eq!(timestamp, frame / 2 * fixture::VIDEO_DELTA as u64);
	}

	// One decoder per keyframe group, each closed after its flush.
	{
		let counters = counters.lock();
		assert_eq!(counters.decoders, 3);
		assert_eq!(counters.closed, 3);
		assert_eq!(counters.decoded, 30);
	}

	pipeline.play_audio().await.unwrap();
	let played = pipeline.wait_audio().await;
	assert_eq!(played.len(), 1);
	assert_eq!(played[0].scheduled, 50);

	pipeline.close().await;

	// Every decoded frame was released exactly once.
	let counters = counters.lock();
	assert_eq!(counters.released.len(), 30);
	assert!(counters.released.values().all(|count| *count == 1));
}

#[tokio::test]
async fn broken_asset() {
	let dir = tempfile::tempdir().unwrap();
	let good = write(&dir, "good.mp4", Fixture::default().encode());
	let bad = write(&dir, "bad.mp4", Bytes::from_static(b"this is not an mp4 file at all"));

	let movie = Movie::from_json(&format!(
		r#"{{
			"fps": 30, "width": 320, "height": 240,
			"objects": [
				{{ "type": "video", "id": "good", "start": 0, "duration": 30, "src": "{good}" }},
				{{ "type": "video", "id": "bad", "start": 0, "duration": 30, "src": "{bad}" }}
			]
		}}"#
	))
	.unwrap();

	let pipeline = Pipeline::new(movie, Config::default(), TestBackend::default(), Screen::default(), Speaker::default());

	match pipeline.load().await {
		Err(Error::Load(failed)) => assert_eq!(failed, vec!["bad".to_string()]),
		res => panic!("unexpected load result: {res:?}"),
	}

	pipeline.buffer(0).await.unwrap();
	assert!(pipeline.get_frame("good", 0).is_some());
	assert!(pipeline.get_frame("bad", 0).is_none());
}
