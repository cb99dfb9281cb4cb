use director_mux::{Group, catalog::VideoConfig};

/// The frame range covered by one keyframe group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
	pub start: i64,
	pub end: i64,
}

impl Span {
	/// Both ranges are inclusive.
	pub fn intersects(&self, lo: i64, hi: i64) -> bool {
		self.start <= hi && lo <= self.end
	}
}

/// Keyframe groups by native frame index, sorted by start.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
	spans: Vec<Span>,
}

impl GroupIndex {
	pub fn new(groups: &[Group], config: &VideoConfig) -> Self {
		let spans: Vec<Span> = groups
			.iter()
			.map(|group| Span {
				start: config.frame_index(group.start),
				end: config.frame_index(group.end),
			})
			.collect();

		if !spans.is_sorted_by_key(|span| span.start) {
			tracing::warn!("keyframe groups are not sorted");
		}

		Self { spans }
	}

	pub fn len(&self) -> usize {
		self.spans.len()
	}

	pub fn is_empty(&self) -> bool {
		self.spans.is_empty()
	}

	pub fn span(&self, index: usize) -> Option<Span> {
		self.spans.get(index).copied()
	}

	/// The indexes of every group intersecting `[lo, hi]`, in order.
	///
	/// Starts from the group covering `lo` and stops at the first group starting after `hi`,
	/// so the cost follows the size of the window rather than the length of the track.
	pub fn intersecting(&self, lo: i64, hi: i64) -> impl Iterator<Item = usize> + '_ {
		let first = self.spans.partition_point(|span| span.start <= lo).saturating_sub(1);

		self.spans[first..]
			.iter()
			.enumerate()
			.take_while(move |(_, span)| span.start <= hi)
			.filter(move |(_, span)| span.intersects(lo, hi))
			.map(move |(index, _)| first + index)
	}
}
