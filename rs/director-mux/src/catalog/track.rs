/// Metadata about one track, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
	pub id: u32,

	/// Ticks per second.
	pub timescale: u64,

	/// The declared number of samples, or 0 when unknown (fragmented files).
	pub sample_count: u64,

	/// The declared duration in ticks, or 0 when unknown.
	pub duration: u64,
}

/// The two kinds of track an asset may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
	Video,
	Audio,
}
