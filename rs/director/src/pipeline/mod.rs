//! Loading, buffering, and rendering a [`Movie`].
mod coalesce;
mod loader;
mod movie;
mod render;

pub use coalesce::*;
pub use loader::*;
pub use movie::*;
pub use render::*;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::audio::{AudioOutput, Played, Reference, Scheduler};
use crate::cache::{AudioBlockSet, Window};
use crate::decode::Backend;
use crate::{Config, Error, Result};

struct Loaded<B: Backend> {
	assets: Assets<B>,

	// One pending-target mailbox per video asset.
	coalescers: HashMap<String, Coalescer>,
}

/// Plays a movie: loads its assets, keeps frames buffered around the cursor, renders, and plays audio.
///
/// The playback loop is expected to await [`Pipeline::buffer`] then [`Pipeline::render`] for
/// each frame, so frame production runs at whatever rate decoding allows.
pub struct Pipeline<B: Backend, C: Compositor<B::Frame>, O: AudioOutput> {
	movie: Arc<Movie>,
	config: Config,
	loader: Loader<B>,
	output: Arc<O>,

	loaded: OnceCell<Loaded<B>>,

	// The compositor moves into the renderer once loading completes.
	compositor: Mutex<Option<C>>,
	renderer: Mutex<Option<MovieRenderer<B, C>>>,

	audio: Mutex<Vec<JoinHandle<Played>>>,
}

impl<B: Backend, C: Compositor<B::Frame>, O: AudioOutput> Pipeline<B, C, O> {
	pub fn new(movie: Movie, config: Config, backend: B, compositor: C, output: O) -> Self {
		let window = Window::from(&config.cache);

		Self {
			movie: Arc::new(movie),
			config,
			loader: Loader::new(Arc::new(backend), window),
			output: Arc::new(output),
			loaded: OnceCell::new(),
			compositor: Mutex::new(Some(compositor)),
			renderer: Mutex::new(None),
			audio: Mutex::new(Vec::new()),
		}
	}

	pub fn movie(&self) -> &Movie {
		&self.movie
	}

	/// Load every asset in parallel, then set up rendering.
	///
	/// Assets that failed are reported by id, but everything else is ready to play.
	/// Later calls return the same outcome without loading again.
	pub async fn load(&self) -> Result<()> {
		let loaded = self
			.loaded
			.get_or_init(|| async {
				let assets = self.loader.fetch(&self.movie).await;

				let coalescers = assets
					.loaded
					.iter()
					.filter(|(_, asset)| asset.video().is_some())
					.map(|(id, _)| (id.clone(), Coalescer::new()))
					.collect();

				if let Some(compositor) = self.compositor.lock().take() {
					*self.renderer.lock() = Some(MovieRenderer::new(self.movie.clone(), &assets, compositor));
				}

				Loaded { assets, coalescers }
			})
			.await;

		match loaded.assets.failed.is_empty() {
			true => Ok(()),
			false => Err(Error::Load(loaded.assets.failed.iter().map(|(id, _)| id.clone()).collect())),
		}
	}

	fn loaded(&self) -> Result<&Loaded<B>> {
		self.loaded.get().ok_or(Error::NotLoaded)
	}

	/// Buffer every video asset around `frame`.
	///
	/// If an asset is already buffering, `frame` replaces whatever target was waiting and this
	/// returns immediately; the caller driving that asset runs one more pass for the latest target.
	pub async fn buffer(&self, frame: u64) -> Result<()> {
		let loaded = self.loaded()?;
		let fps = self.movie.fps;

		let passes = loaded.coalescers.iter().filter_map(|(id, coalescer)| {
			let buffer = loaded.assets.get(id)?.video()?;
			Some(coalescer.run(frame, move |target| buffer.buffer_from(target, fps)))
		});

		let results = join_all(passes).await;
		tracing::trace!(frame, ?results, "buffered");

		Ok(())
	}

	/// Show `frame` on the compositor. Rendering the last rendered frame again does nothing.
	pub async fn render(&self, frame: u64) -> Result<()> {
		let mut renderer = self.renderer.lock();
		renderer.as_mut().ok_or(Error::NotLoaded)?.render(frame);
		Ok(())
	}

	/// Attach the compositor to the surface it draws on.
	pub fn attach(&self, surface: C::Surface) -> Result<()> {
		let mut renderer = self.renderer.lock();
		renderer.as_mut().ok_or(Error::NotLoaded)?.attach(surface);
		Ok(())
	}

	/// The decoded frame of a video object at a timeline frame, if it's buffered.
	pub fn get_frame(&self, id: &str, frame: u64) -> Option<B::Frame> {
		let buffer = self.loaded().ok()?.assets.get(id)?.video()?;
		buffer.get_frame(frame, self.movie.fps)
	}

	/// The decoded audio of an object, if it has any.
	pub fn audio_data(&self, id: &str) -> Option<Arc<AudioBlockSet>> {
		self.loaded().ok()?.assets.get(id)?.audio()?.data()
	}

	/// Start playing the audio of every asset from the beginning of the timeline.
	///
	/// Every asset shares one reference time, captured when the first block is queued.
	/// Any audio already playing is stopped first.
	pub async fn play_audio(&self) -> Result<()> {
		let loaded = self.loaded()?;
		self.stop_audio();

		let reference = Reference::new();
		let mut tasks = self.audio.lock();

		for object in &self.movie.objects {
			let Some(data) = loaded.assets.get(object.id()).and_then(Asset::audio).and_then(|audio| audio.data()) else {
				continue;
			};

			let scheduler = Scheduler::new(self.output.clone(), self.config.audio.clone(), reference.clone())
				.with_offset(self.movie.time(object.start()));

			let id = object.id().to_string();
			tracing::debug!(id, blocks = data.blocks(), "playing audio");

			tasks.push(tokio::spawn(async move {
				let played = scheduler.play(&data).await;
				tracing::debug!(id, scheduled = played.scheduled, dropped = played.dropped, "audio queued");
				played
			}));
		}

		Ok(())
	}

	/// Stop queueing audio and silence whatever was already queued.
	pub fn stop_audio(&self) {
		let tasks = std::mem::take(&mut *self.audio.lock());
		if tasks.is_empty() {
			return;
		}

		for task in tasks {
			task.abort();
		}

		self.output.stop();
	}

	/// Wait until every asset's audio has been queued.
	pub async fn wait_audio(&self) -> Vec<Played> {
		let tasks = std::mem::take(&mut *self.audio.lock());
		join_all(tasks).await.into_iter().filter_map(|res| res.ok()).collect()
	}

	/// Release every decoded frame.
	pub async fn close(&self) {
		self.stop_audio();

		let Ok(loaded) = self.loaded() else {
			return;
		};

		for asset in loaded.assets.loaded.values() {
			if let Some(buffer) = asset.video() {
				buffer.close().await;
			}
		}
	}
}

impl<B: Backend, C: Compositor<B::Frame>, O: AudioOutput> Drop for Pipeline<B, C, O> {
	fn drop(&mut self) {
		for task in self.audio.get_mut().drain(..) {
			task.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::audio::Cue;
	use crate::decode::mock::MockBackend;
	use crate::pipeline::render::tests::{Call, Recorder};
	use director_mux::import::fixture::Fixture;
	use std::time::Duration;

	#[derive(Default)]
	struct Output {
		origin: Mutex<Option<tokio::time::Instant>>,
		started: Mutex<Vec<(usize, Duration)>>,
		stopped: Mutex<usize>,
	}

	impl AudioOutput for Output {
		fn now(&self) -> Duration {
			self.origin.lock().get_or_insert_with(tokio::time::Instant::now).elapsed()
		}

		fn start(&self, cue: Cue, at: Duration) {
			self.started.lock().push((cue.index, at));
		}

		fn stop(&self) {
			*self.stopped.lock() += 1;
		}
	}

	struct Files {
		_dir: tempfile::TempDir,
		video: url::Url,
		broken: url::Url,
		image: url::Url,
	}

	fn files() -> Files {
		let dir = tempfile::tempdir().unwrap();

		let write = |name: &str, data: &[u8]| {
			let path = dir.path().join(name);
			std::fs::write(&path, data).unwrap();
			url::Url::from_file_path(path).unwrap()
		};

		let video = write("video.mp4", &Fixture::default().encode());
		let image = write("image.png", b"not really a png");
		let broken = write(
			"broken.mp4",
			&Fixture {
				parameter_sets: false,
				..Default::default()
			}
			.encode(),
		);

		Files {
			_dir: dir,
			video,
			broken,
			image,
		}
	}

	fn movie(files: &Files) -> Movie {
		let json = serde_json::json!({
			"fps": 30,
			"width": 320,
			"height": 240,
			"objects": [
				{ "type": "video", "id": "clip", "start": 0, "duration": 30, "src": files.video },
				{ "type": "video", "id": "later", "start": 30, "duration": 30, "src": files.video },
				{ "type": "video", "id": "broken", "start": 0, "duration": 30, "src": files.broken },
				{ "type": "image", "id": "logo", "start": 0, "duration": 60, "src": files.image },
			]
		});

		serde_json::from_value(json).unwrap()
	}

	type TestPipeline = Pipeline<MockBackend, Recorder, Output>;

	fn pipeline(movie: Movie, backend: &MockBackend) -> TestPipeline {
		let mut config = Config::default();
		config.cache.lookback = 0;
		config.cache.lookahead = 5;
		config.audio.batch = 10;
		config.audio.lead = Duration::from_millis(50);

		Pipeline::new(movie, config, backend.clone(), Recorder::default(), Output::default())
	}

	#[tokio::test]
	async fn not_loaded() {
		let files = files();
		let pipeline = pipeline(movie(&files), &MockBackend::default());

		assert!(matches!(pipeline.buffer(0).await, Err(Error::NotLoaded)));
		assert!(matches!(pipeline.render(0).await, Err(Error::NotLoaded)));
		assert!(matches!(pipeline.attach(()), Err(Error::NotLoaded)));
		assert!(matches!(pipeline.play_audio().await, Err(Error::NotLoaded)));
		assert!(pipeline.get_frame("clip", 0).is_none());
	}

	#[tokio::test]
	async fn partial_load() {
		let files = files();
		let pipeline = pipeline(movie(&files), &MockBackend::default());

		let Err(Error::Load(failed)) = pipeline.load().await else {
			panic!("expected a load error");
		};
		assert_eq!(failed, vec!["broken".to_string()]);

		// The rest of the movie plays.
		pipeline.attach(()).unwrap();
		pipeline.buffer(0).await.unwrap();
		pipeline.render(0).await.unwrap();

		let calls = pipeline.renderer.lock().as_mut().unwrap().compositor().calls.clone();
		assert_eq!(
			calls,
			vec![
				Call::Attach(320, 240),
				Call::Mount("clip".into()),
				Call::Video("clip".into(), 0),
				Call::Mount("logo".into()),
				Call::Image("logo".into()),
			]
		);

		// Loading again reports the same outcome.
		assert!(matches!(pipeline.load().await, Err(Error::Load(_))));
	}

	#[tokio::test]
	async fn buffer_window() {
		let files = files();
		let backend = MockBackend::default();
		let pipeline = pipeline(movie(&files), &backend);
		let _ = pipeline.load().await;

		pipeline.buffer(0).await.unwrap();
		assert!(pipeline.get_frame("clip", 0).is_some());
		assert!(pipeline.get_frame("clip", 9).is_some());
		assert!(pipeline.get_frame("clip", 10).is_none());

		// The second asset starts at frame 30, well outside its window.
		assert!(pipeline.get_frame("later", 30).is_none());

		pipeline.buffer(28).await.unwrap();
		assert!(pipeline.get_frame("clip", 0).is_none());
		assert!(pipeline.get_frame("clip", 20).is_some());
		assert!(pipeline.get_frame("later", 30).is_some());

		pipeline.close().await;
		assert!(pipeline.get_frame("clip", 20).is_none());

		let stats = backend.stats();
		assert_eq!(stats.released(), stats.frames);
		assert!(stats.released.values().all(|count| *count <= 2));
	}

	#[tokio::test(start_paused = true)]
	async fn audio() {
		let files = files();
		let pipeline = pipeline(movie(&files), &MockBackend::default());
		let _ = pipeline.load().await;

		let data = pipeline.audio_data("clip").unwrap();
		assert_eq!(data.blocks(), 50);
		assert!(pipeline.audio_data("logo").is_none());

		pipeline.play_audio().await.unwrap();
		let played = pipeline.wait_audio().await;
		assert_eq!(played.len(), 2);
		assert!(played.iter().all(|played| played.scheduled == 50 && played.dropped == 0));

		// The second asset starts one second into the timeline.
		let started = pipeline.output.started.lock();
		let later = started.iter().filter(|(_, at)| *at >= Duration::from_secs(1)).count();
		assert_eq!(later, 50);
	}

	#[tokio::test(start_paused = true)]
	async fn stop_audio() {
		let files = files();
		let pipeline = pipeline(movie(&files), &MockBackend::default());
		let _ = pipeline.load().await;

		pipeline.play_audio().await.unwrap();
		tokio::task::yield_now().await;
		pipeline.stop_audio();

		assert_eq!(*pipeline.output.stopped.lock(), 1);
		assert!(pipeline.wait_audio().await.is_empty());
	}
}
