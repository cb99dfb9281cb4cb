use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use director_mux::{Group, catalog::VideoConfig};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::{GroupIndex, Window, relative_index};
use crate::decode::{Backend, Flushed, Release, Session};

/// Decoded frames of one video asset, kept only around the playback cursor.
///
/// [`FrameBuffer::buffer_from`] decodes every keyframe group intersecting the window around a
/// cursor and releases frames of groups that fell out of it. [`FrameBuffer::get_frame`] is a
/// plain lookup and never decodes.
///
/// Frames are keyed by native frame index: the chunk timestamp over the nominal frame duration,
/// rounded to the nearest frame rather than truncated. The consumer maps onto that index with the
/// exact native rate, never the rounded [`VideoConfig::fps`].
/// Each stored frame is released exactly once: on eviction, on [`FrameBuffer::close`], or on drop.
pub struct FrameBuffer<B: Backend> {
	backend: Arc<B>,
	config: VideoConfig,
	groups: Vec<Group>,
	index: GroupIndex,

	// The consumer frame where this asset begins.
	start: u64,
	window: Window,

	frames: RwLock<HashMap<i64, B::Frame>>,

	// Groups currently decoded. Held for the duration of a pass, so passes never overlap.
	retained: Mutex<BTreeSet<usize>>,
}

impl<B: Backend> FrameBuffer<B> {
	pub fn new(backend: Arc<B>, config: VideoConfig, groups: Vec<Group>, start: u64, window: Window) -> Self {
		let index = GroupIndex::new(&groups, &config);

		Self {
			backend,
			config,
			groups,
			index,
			start,
			window,
			frames: Default::default(),
			retained: Default::default(),
		}
	}

	pub fn config(&self) -> &VideoConfig {
		&self.config
	}

	pub fn groups(&self) -> &[Group] {
		&self.groups
	}

	/// The native frame index shown at a consumer frame.
	pub fn relative_index(&self, frame: u64, fps: f64) -> i64 {
		relative_index(frame, self.start, self.config.frame_rate(), fps)
	}

	/// Decode the window around `frame` and release everything outside it.
	pub async fn buffer_from(&self, frame: u64, fps: f64) {
		let mut retained = self.retained.lock().await;

		let center = self.relative_index(frame, fps);
		let (lo, hi) = self.window.range(center);

		let wanted: BTreeSet<usize> = self.index.intersecting(lo, hi).collect();
		let evict: Vec<usize> = retained.difference(&wanted).copied().collect();
		let decode: Vec<usize> = wanted.difference(&retained).copied().collect();

		tracing::debug!(frame, center, lo, hi, evict = evict.len(), decode = decode.len(), "buffering");

		for group in evict {
			let released = self.evict(group);
			retained.remove(&group);
			tracing::trace!(group, released, "evicted group");
		}

		// Sequential on purpose: one decoder per group, one group at a time.
		for group in decode {
			let stored = self.decode(group).await;
			retained.insert(group);
			tracing::trace!(group, stored, "decoded group");
		}
	}

	/// The frame shown at a consumer frame, if it's decoded.
	pub fn get_frame(&self, frame: u64, fps: f64) -> Option<B::Frame> {
		let index = self.relative_index(frame, fps);
		self.frames.read().get(&index).cloned()
	}

	/// The number of frames currently held.
	pub fn len(&self) -> usize {
		self.frames.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.frames.read().is_empty()
	}

	/// The groups currently decoded, in order.
	pub async fn retained(&self) -> Vec<usize> {
		self.retained.lock().await.iter().copied().collect()
	}

	/// Release every frame. The buffer may be used again afterwards.
	pub async fn close(&self) {
		let mut retained = self.retained.lock().await;
		retained.clear();

		let released = release_all(&mut self.frames.write());
		tracing::debug!(released, "closed frame buffer");
	}

	fn evict(&self, group: usize) -> usize {
		let Some(group) = self.groups.get(group) else {
			return 0;
		};

		let mut frames = self.frames.write();
		let mut released = 0;

		for chunk in &group.chunks {
			if let Some(frame) = frames.remove(&self.config.frame_index(chunk.timestamp)) {
				frame.release();
				released += 1;
			}
		}

		released
	}

	async fn decode(&self, index: usize) -> usize {
		let Some(group) = self.groups.get(index) else {
			return 0;
		};

		let mut session = match Session::open(self.backend.video(), &self.config) {
			Ok(session) => session,
			Err(err) => {
				tracing::warn!(%err, group = index, "failed to configure decoder");
				return 0;
			}
		};

		for chunk in &group.chunks {
			session.submit(chunk.clone());
		}

		let Flushed { outputs, errors } = session.finish().await;

		for err in errors {
			tracing::warn!(%err, group = index, "decode error");
		}

		let mut frames = self.frames.write();
		let stored = outputs.len();

		for picture in outputs {
			let key = self.config.frame_index(picture.timestamp);
			if let Some(previous) = frames.insert(key, picture.frame) {
				previous.release();
			}
		}

		stored
	}
}

impl<B: Backend> Drop for FrameBuffer<B> {
	fn drop(&mut self) {
		release_all(self.frames.get_mut());
	}
}

fn release_all<F: Release>(frames: &mut HashMap<i64, F>) -> usize {
	let count = frames.len();
	for (_, frame) in frames.drain() {
		frame.release();
	}
	count
}
