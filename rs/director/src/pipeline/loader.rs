use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use director_mux::catalog::TrackKind;
use director_mux::import::{Demuxer, Source};
use futures::future::join_all;
use url::Url;

use super::{MediaKind, MediaObject, Movie};
use crate::cache::{AudioBuffer, FrameBuffer, Window};
use crate::decode::Backend;
use crate::{Error, Result};

/// The decoded media of a video or audio object.
pub struct VideoResource<B: Backend> {
	/// Absent for audio objects and for assets without a video track.
	pub video: Option<Arc<FrameBuffer<B>>>,
	pub audio: AudioBuffer,
}

impl<B: Backend> VideoResource<B> {
	/// Demux and index the asset, decoding its audio up front.
	///
	/// Video stays compressed until [`FrameBuffer::buffer_from`] asks for it.
	pub async fn load(backend: Arc<B>, demuxer: Demuxer, kind: MediaKind, start: u64, window: Window) -> Result<Self> {
		let header = demuxer.header().await?;
		tracing::debug!(
			%kind,
			video = header.video.is_some(),
			audio = header.audio.is_some(),
			fragmented = header.fragmented,
			"loading resource"
		);

		let video_config = match kind {
			MediaKind::Video => demuxer.video_config().await?,
			_ => None,
		};
		let audio_config = demuxer.audio_config().await?;

		if video_config.is_none() {
			demuxer.discard(TrackKind::Video).await;
		}

		let videos = demuxer.start_video();
		let audios = demuxer.start_audio();

		let (groups, chunks) = match video_config.is_some() {
			true => futures::try_join!(videos.collect(), audios.collect())?,
			false => (Vec::new(), audios.collect().await?),
		};

		tracing::debug!(groups = groups.len(), audio = chunks.len(), "demuxed resource");

		let audio = match &audio_config {
			Some(config) => AudioBuffer::decode(backend.as_ref(), config, chunks).await,
			None => AudioBuffer::empty(),
		};

		let video = video_config.map(|config| Arc::new(FrameBuffer::new(backend, config, groups, start, window)));

		Ok(Self { video, audio })
	}
}

/// A loaded asset.
pub enum Asset<B: Backend> {
	/// The encoded image, fetched whole.
	Image(Bytes),
	Video(VideoResource<B>),
}

impl<B: Backend> Asset<B> {
	pub fn video(&self) -> Option<&Arc<FrameBuffer<B>>> {
		match self {
			Self::Video(resource) => resource.video.as_ref(),
			Self::Image(_) => None,
		}
	}

	pub fn audio(&self) -> Option<&AudioBuffer> {
		match self {
			Self::Video(resource) => Some(&resource.audio),
			Self::Image(_) => None,
		}
	}

	pub fn image(&self) -> Option<&Bytes> {
		match self {
			Self::Image(image) => Some(image),
			Self::Video(_) => None,
		}
	}
}

/// Every asset that loaded, and the error for each one that didn't.
pub struct Assets<B: Backend> {
	pub loaded: HashMap<String, Asset<B>>,
	pub failed: Vec<(String, Error)>,
}

impl<B: Backend> Assets<B> {
	pub fn get(&self, id: &str) -> Option<&Asset<B>> {
		self.loaded.get(id)
	}
}

/// Fetches the assets of a movie.
pub struct Loader<B: Backend> {
	backend: Arc<B>,
	window: Window,
}

impl<B: Backend> Loader<B> {
	pub fn new(backend: Arc<B>, window: Window) -> Self {
		Self { backend, window }
	}

	/// Load every object in parallel.
	///
	/// A failure only affects its own object; the rest still load.
	pub async fn fetch(&self, movie: &Movie) -> Assets<B> {
		let tasks = movie
			.objects
			.iter()
			.filter(|object| object.kind() != MediaKind::Text)
			.map(|object| async move { (object.id().to_string(), self.load(object).await) });

		let mut assets = Assets {
			loaded: HashMap::new(),
			failed: Vec::new(),
		};

		for (id, res) in join_all(tasks).await {
			match res {
				Ok(asset) => {
					assets.loaded.insert(id, asset);
				}
				Err(err) => {
					tracing::warn!(%err, id, "failed to load asset");
					assets.failed.push((id, err));
				}
			}
		}

		tracing::info!(loaded = assets.loaded.len(), failed = assets.failed.len(), "loaded movie");
		assets
	}

	async fn load(&self, object: &MediaObject) -> Result<Asset<B>> {
		let src = object.src().ok_or_else(|| Error::Movie(format!("{} has no source", object.id())))?;

		match object.kind() {
			MediaKind::Image => Ok(Asset::Image(self.image(src).await?)),
			kind => {
				let demuxer = Demuxer::open(src).await?;
				let resource =
					VideoResource::load(self.backend.clone(), demuxer, kind, object.start(), self.window).await?;
				Ok(Asset::Video(resource))
			}
		}
	}

	async fn image(&self, src: &Url) -> Result<Bytes> {
		let image = Source::open(src).await?.read_all().await?;
		tracing::debug!(%src, size = image.len(), "fetched image");
		Ok(image)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decode::mock::MockBackend;
	use director_mux::import::fixture::Fixture;

	fn window() -> Window {
		Window::new(0, 15)
	}

	#[tokio::test]
	async fn video() {
		let backend = Arc::new(MockBackend::default());
		let demuxer = Demuxer::new(Fixture::default().encode().into());

		let resource = VideoResource::load(backend.clone(), demuxer, MediaKind::Video, 0, window()).await.unwrap();

		let video = resource.video.unwrap();
		assert_eq!(video.groups().len(), 3);
		assert!(video.is_empty());

		let audio = resource.audio.data().unwrap();
		assert_eq!(audio.blocks(), 50);
		assert_eq!(audio.channel_count, 2);
	}

	#[tokio::test]
	async fn audio_only() {
		let backend = Arc::new(MockBackend::default());
		let demuxer = Demuxer::new(Fixture::default().encode().into());

		let resource = VideoResource::load(backend, demuxer, MediaKind::Audio, 0, window()).await.unwrap();
		assert!(resource.video.is_none());
		assert_eq!(resource.audio.data().unwrap().blocks(), 50);
	}

	#[tokio::test]
	async fn silent() {
		let fixture = Fixture {
			audio: false,
			..Default::default()
		};

		let backend = Arc::new(MockBackend::default());
		let resource = VideoResource::load(backend, Demuxer::new(fixture.encode().into()), MediaKind::Video, 0, window())
			.await
			.unwrap();

		assert!(resource.video.is_some());
		assert!(resource.audio.data().is_none());
	}

	#[tokio::test]
	async fn parse_error() {
		let fixture = Fixture {
			parameter_sets: false,
			..Default::default()
		};

		let backend = Arc::new(MockBackend::default());
		let res = VideoResource::load(backend, Demuxer::new(fixture.encode().into()), MediaKind::Video, 0, window()).await;
		assert!(matches!(res, Err(Error::Demux(director_mux::Error::MissingParameterSets(1)))));
	}
}
