use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use url::Url;

use super::{Event, Header, Mp4, Source};
use crate::catalog::{AudioConfig, TrackKind, VideoConfig};
use crate::{Chunk, Error, Group, GroupBuilder, Result};

/// A batch of output for one track.
///
/// `last` is set on the final batch, which may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
	pub items: Vec<T>,
	pub last: bool,
}

impl<T> Batch<T> {
	fn new(items: Vec<T>, last: bool) -> Self {
		Self { items, last }
	}
}

/// Demuxes an MP4 stream on demand.
///
/// Nothing is read until a config is requested or a track is started. Every clone shares the
/// same stream: the header is parsed once and all callers waiting on it see the same outcome,
/// including the error if parsing failed.
#[derive(Clone)]
pub struct Demuxer {
	state: Arc<State>,
}

struct State {
	header: OnceCell<Result<Arc<Header>>>,
	pump: Mutex<Pump>,
}

// Owns the stream and the parser; whoever needs more data drives it.
struct Pump {
	source: Source,
	parser: Mp4,
	video: Queue,
	audio: Queue,
	done: bool,
	error: Option<Error>,
}

// Demuxed chunks waiting for their track consumer.
#[derive(Default)]
struct Queue {
	chunks: VecDeque<Chunk>,
	discard: bool,
}

impl Queue {
	fn push(&mut self, chunk: Chunk) {
		if !self.discard {
			self.chunks.push_back(chunk);
		}
	}
}

impl Pump {
	async fn step(&mut self) -> Result<()> {
		if let Some(err) = &self.error {
			return Err(err.clone());
		}

		if self.done {
			return Ok(());
		}

		let res = self.read().await;
		if let Err(err) = &res {
			tracing::warn!(%err, "demux failed");
			self.error = Some(err.clone());
		}

		res
	}

	async fn read(&mut self) -> Result<()> {
		let Some((offset, data)) = self.source.next().await? else {
			let missing = self.parser.finish()?;
			if missing > 0 {
				tracing::warn!(missing, "stream ended before every sample was received");
			}

			self.done = true;
			return Ok(());
		};

		for event in self.parser.append(offset, &data)? {
			match event {
				Event::Header(header) => {
					tracing::debug!(video = header.video.is_some(), audio = header.audio.is_some(), "parsed header")
				}
				Event::Chunk(kind, chunk) => self.queue(kind).push(chunk),
			}
		}

		Ok(())
	}

	fn queue(&mut self, kind: TrackKind) -> &mut Queue {
		match kind {
			TrackKind::Video => &mut self.video,
			TrackKind::Audio => &mut self.audio,
		}
	}
}

impl Demuxer {
	pub fn new(source: Source) -> Self {
		let pump = Pump {
			source,
			parser: Mp4::new(),
			video: Queue::default(),
			audio: Queue::default(),
			done: false,
			error: None,
		};

		Self {
			state: Arc::new(State {
				header: OnceCell::new(),
				pump: Mutex::new(pump),
			}),
		}
	}

	pub async fn open(url: &Url) -> Result<Self> {
		Ok(Self::new(Source::open(url).await?))
	}

	/// Wait for the `moov` box, reading as much of the stream as needed.
	pub async fn header(&self) -> Result<Arc<Header>> {
		self.state
			.header
			.get_or_init(|| async {
				let mut pump = self.state.pump.lock().await;

				loop {
					if let Some(header) = pump.parser.header() {
						return Ok(header.clone());
					}

					if pump.done {
						return Err(Error::parse("missing moov box"));
					}

					pump.step().await?;
				}
			})
			.await
			.clone()
	}

	/// The video decoder config, or [`None`] if the asset has no video track.
	pub async fn video_config(&self) -> Result<Option<VideoConfig>> {
		Ok(self.header().await?.video.as_ref().map(|video| video.config.clone()))
	}

	/// The audio decoder config, or [`None`] if the asset has no audio track.
	pub async fn audio_config(&self) -> Result<Option<AudioConfig>> {
		Ok(self.header().await?.audio.as_ref().map(|audio| audio.config.clone()))
	}

	/// Stop holding chunks of a track nobody will consume.
	///
	/// Queued chunks are dropped, and so is every chunk demuxed afterwards. A consumer started
	/// later sees the track end early.
	pub async fn discard(&self, kind: TrackKind) {
		let mut pump = self.state.pump.lock().await;
		let queue = pump.queue(kind);

		tracing::debug!(?kind, queued = queue.chunks.len(), "discarding track");
		queue.discard = true;
		queue.chunks.clear();
	}

	/// Start consuming the video track as keyframe groups.
	pub fn start_video(&self) -> VideoConsumer {
		VideoConsumer {
			track: TrackConsumer::new(self.clone(), TrackKind::Video),
			groups: GroupBuilder::new(),
		}
	}

	/// Start consuming the audio track as a flat sequence of chunks.
	pub fn start_audio(&self) -> AudioConsumer {
		AudioConsumer {
			track: TrackConsumer::new(self.clone(), TrackKind::Audio),
		}
	}
}

struct TrackConsumer {
	demuxer: Demuxer,
	kind: TrackKind,
	received: u64,
	finished: bool,
}

impl TrackConsumer {
	fn new(demuxer: Demuxer, kind: TrackKind) -> Self {
		Self {
			demuxer,
			kind,
			received: 0,
			finished: false,
		}
	}

	// Returns the next non-empty run of chunks, or an empty run when the track is complete.
	async fn next(&mut self) -> Result<Option<(Vec<Chunk>, bool)>> {
		if self.finished {
			return Ok(None);
		}

		let header = self.demuxer.header().await?;
		let Some(track) = header.track(self.kind) else {
			tracing::debug!(kind = ?self.kind, "track missing");
			self.finished = true;
			return Ok(Some((Vec::new(), true)));
		};

		let mut pump = self.demuxer.state.pump.lock().await;

		loop {
			let chunks: Vec<Chunk> = pump.queue(self.kind).chunks.drain(..).collect();
			self.received += chunks.len() as u64;

			// Progressive files declare their sample count; fragmented files end with the stream.
			let complete = match track.sample_count {
				0 => pump.done,
				count => self.received >= count || pump.done,
			};

			if complete {
				if track.sample_count > 0 && self.received != track.sample_count {
					tracing::warn!(
						kind = ?self.kind,
						received = self.received,
						declared = track.sample_count,
						"sample count mismatch"
					);
				}

				self.finished = true;
				return Ok(Some((chunks, true)));
			}

			if !chunks.is_empty() {
				return Ok(Some((chunks, false)));
			}

			pump.step().await?;
		}
	}
}

/// Delivers the video track as batches of complete keyframe groups.
pub struct VideoConsumer {
	track: TrackConsumer,
	groups: GroupBuilder,
}

impl VideoConsumer {
	/// The next batch of groups, or [`None`] after the last batch was returned.
	pub async fn next(&mut self) -> Result<Option<Batch<Group>>> {
		loop {
			let Some((chunks, last)) = self.track.next().await? else {
				return Ok(None);
			};

			let mut groups: Vec<Group> = chunks.into_iter().filter_map(|chunk| self.groups.push(chunk)).collect();

			if last {
				groups.extend(self.groups.finish());
				return Ok(Some(Batch::new(groups, true)));
			}

			// Chunks were buffered into a group that isn't closed yet.
			if !groups.is_empty() {
				tracing::trace!(count = groups.len(), "video groups");
				return Ok(Some(Batch::new(groups, false)));
			}
		}
	}

	/// Collect every remaining group.
	pub async fn collect(mut self) -> Result<Vec<Group>> {
		let mut groups = Vec::new();
		while let Some(batch) = self.next().await? {
			groups.extend(batch.items);
		}
		Ok(groups)
	}
}

/// Delivers the audio track as batches of chunks.
pub struct AudioConsumer {
	track: TrackConsumer,
}

impl AudioConsumer {
	/// The next batch of chunks, or [`None`] after the last batch was returned.
	pub async fn next(&mut self) -> Result<Option<Batch<Chunk>>> {
		Ok(self.track.next().await?.map(|(chunks, last)| Batch::new(chunks, last)))
	}

	/// Collect every remaining chunk.
	pub async fn collect(mut self) -> Result<Vec<Chunk>> {
		let mut chunks = Vec::new();
		while let Some(batch) = self.next().await? {
			chunks.extend(batch.items);
		}
		Ok(chunks)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::import::fixture::{self, Fixture};
	use bytes::Bytes;

	fn split(data: Bytes, size: usize) -> Source {
		let buffers = (0..data.len())
			.step_by(size)
			.map(|start| data.slice(start..(start + size).min(data.len())))
			.collect::<Vec<_>>();
		Source::from(buffers)
	}

	#[tokio::test]
	async fn progressive() {
		let fixture = Fixture::default();
		let demuxer = Demuxer::new(split(fixture.encode(), 7));

		let video = demuxer.video_config().await.unwrap().unwrap();
		assert_eq!(video.codec.to_string(), "avc1.42c01e");
		assert_eq!((video.coded_width, video.coded_height), (320, 240));
		assert_eq!(video.frame_duration, 1000);
		assert_eq!(video.fps, 30);
		assert_eq!(video.description.len(), 7 + 2 + fixture::SPS.len() + 2 + fixture::PPS.len());

		let audio = demuxer.audio_config().await.unwrap().unwrap();
		assert_eq!(audio.codec.to_string(), "opus");
		assert_eq!((audio.sample_rate, audio.channel_count), (48_000, 2));

		let groups = demuxer.start_video().collect().await.unwrap();
		assert_eq!(groups.len(), 3);
		assert!(groups.iter().all(|group| group.len() == 10 && group.chunks[0].is_key()));
		assert_eq!((groups[1].start, groups[1].end), (10_000, 19_000));
		assert_eq!(groups[2].chunks[3].payload, fixture.video_payload(23));

		let chunks = demuxer.start_audio().collect().await.unwrap();
		assert_eq!(chunks.len(), 50);
		assert_eq!(chunks[7].timestamp, 7 * 960);
		assert_eq!(chunks[7].payload, fixture.audio_payload(7));
	}

	#[tokio::test]
	async fn moov_at_end() {
		let fixture = Fixture {
			moov_first: false,
			..Default::default()
		};
		let demuxer = Demuxer::new(split(fixture.encode(), 64));

		let groups = demuxer.start_video().collect().await.unwrap();
		assert_eq!(groups.len(), 3);
		assert_eq!(groups[0].chunks[0].payload, fixture.video_payload(0));
	}

	#[tokio::test]
	async fn shared_header() {
		let demuxer = Demuxer::new(split(Fixture::default().encode(), 16));

		let (video, audio) = tokio::join!(demuxer.video_config(), demuxer.audio_config());
		assert!(video.unwrap().is_some());
		assert!(audio.unwrap().is_some());
	}

	#[tokio::test]
	async fn missing_audio() {
		let fixture = Fixture {
			audio: false,
			..Default::default()
		};
		let demuxer = Demuxer::new(Source::from(fixture.encode()));

		assert!(demuxer.audio_config().await.unwrap().is_none());

		let mut audio = demuxer.start_audio();
		let batch = audio.next().await.unwrap().unwrap();
		assert!(batch.items.is_empty());
		assert!(batch.last);
		assert!(audio.next().await.unwrap().is_none());

		assert_eq!(demuxer.start_video().collect().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn missing_parameter_sets() {
		let fixture = Fixture {
			parameter_sets: false,
			..Default::default()
		};
		let demuxer = Demuxer::new(Source::from(fixture.encode()));

		let err = demuxer.video_config().await.unwrap_err();
		assert!(matches!(err, Error::MissingParameterSets(1)));

		// Every caller sees the same failure.
		assert!(matches!(demuxer.audio_config().await, Err(Error::MissingParameterSets(1))));
		assert!(demuxer.start_video().next().await.is_err());
	}

	#[tokio::test]
	async fn not_mp4() {
		let demuxer = Demuxer::new(Source::from(Bytes::from_static(b"definitely not an mp4 file")));
		assert!(demuxer.video_config().await.is_err());
	}

	#[tokio::test]
	async fn discard() {
		let demuxer = Demuxer::new(split(Fixture::default().encode(), 64));
		demuxer.header().await.unwrap();
		demuxer.discard(TrackKind::Video).await;

		let chunks = demuxer.start_audio().collect().await.unwrap();
		assert_eq!(chunks.len(), 50);
		assert!(demuxer.state.pump.lock().await.video.chunks.is_empty());

		// The stream is exhausted, so a late consumer ends immediately.
		assert!(demuxer.start_video().collect().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn last_batch() {
		let demuxer = Demuxer::new(split(Fixture::default().encode(), 3));
		let mut video = demuxer.start_video();

		let mut batches = Vec::new();
		while let Some(batch) = video.next().await.unwrap() {
			batches.push(batch);
		}

		assert!(batches.last().unwrap().last);
		assert!(batches[..batches.len() - 1].iter().all(|batch| !batch.last));
		assert_eq!(batches.iter().map(|batch| batch.items.len()).sum::<usize>(), 3);
	}
}
