use crate::CacheConfig;

/// The range of native frames to keep decoded around a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
	pub lookback: u64,
	pub lookahead: u64,
}

impl Window {
	pub fn new(lookback: u64, lookahead: u64) -> Self {
		Self { lookback, lookahead }
	}

	/// The inclusive bounds of the window around `center`.
	pub fn range(&self, center: i64) -> (i64, i64) {
		(
			center.saturating_sub_unsigned(self.lookback),
			center.saturating_add_unsigned(self.lookahead),
		)
	}
}

impl From<&CacheConfig> for Window {
	fn from(config: &CacheConfig) -> Self {
		Self::new(config.lookback, config.lookahead)
	}
}

/// Convert a frame on the consumer's timeline into a native frame index of the asset.
///
/// `start` is the consumer frame where the asset begins. Frames before it map to negative indexes.
pub fn relative_index(frame: u64, start: u64, native_fps: f64, consumer_fps: f64) -> i64 {
	let ratio = native_fps / consumer_fps;
	((frame as f64 - start as f64) * ratio).floor() as i64
}
