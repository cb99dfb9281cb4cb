use crate::Chunk;

/// A run of chunks starting at a keyframe, decodable without any prior group.
///
/// `start` and `end` are the minimum and maximum chunk timestamps, in track ticks.
/// These differ from the first and last chunk when B-frames reorder presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
	pub start: u64,
	pub end: u64,
	pub chunks: Vec<Chunk>,
}

impl Group {
	/// Build a group from chunks in decode order.
	///
	/// Returns [`None`] if there are no chunks.
	pub fn new(chunks: Vec<Chunk>) -> Option<Self> {
		let start = chunks.iter().map(|c| c.timestamp).min()?;
		let end = chunks.iter().map(|c| c.timestamp).max()?;

		Some(Self { start, end, chunks })
	}

	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}
}

/// Splits a stream of video chunks into groups at every keyframe.
///
/// A group is only handed out once the next keyframe (or the end of the track) closes it.
#[derive(Debug, Default)]
pub struct GroupBuilder {
	current: Vec<Chunk>,
}

impl GroupBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a chunk, returning the previous group if this chunk starts a new one.
	pub fn push(&mut self, chunk: Chunk) -> Option<Group> {
		let closed = match chunk.is_key() && !self.current.is_empty() {
			true => Group::new(std::mem::take(&mut self.current)),
			false => None,
		};

		if self.current.is_empty() && !chunk.is_key() {
			tracing::warn!(timestamp = chunk.timestamp, "group does not start with a keyframe");
		}

		self.current.push(chunk);
		closed
	}

	/// Close whatever group is still open.
	pub fn finish(&mut self) -> Option<Group> {
		Group::new(std::mem::take(&mut self.current))
	}
}
