use bytes::Bytes;

/// Whether a chunk can be decoded on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
	Key,
	Delta,
}

/// A single coded sample.
///
/// `timestamp` and `duration` are in track ticks; the timestamp is the composition time.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
	pub kind: ChunkKind,
	pub timestamp: u64,
	pub duration: u64,
	pub payload: Bytes,
}

impl Chunk {
	pub fn is_key(&self) -> bool {
		self.kind == ChunkKind::Key
	}
}

impl std::fmt::Debug for Chunk {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Chunk")
			.field("kind", &self.kind)
			.field("timestamp", &self.timestamp)
			.field("duration", &self.duration)
			.field("size", &self.payload.len())
			.finish()
	}
}
