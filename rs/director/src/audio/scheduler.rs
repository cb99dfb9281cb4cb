use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{AudioOutput, Cue};
use crate::SchedulerConfig;
use crate::cache::AudioBlockSet;

/// The device time at which the timeline started, captured on first use.
///
/// Shared by every asset of a timeline so they stay in sync.
#[derive(Debug, Clone, Default)]
pub struct Reference(Arc<Mutex<Option<Duration>>>);

impl Reference {
	pub fn new() -> Self {
		Self::default()
	}

	/// Return the reference, capturing `now` if it isn't set yet.
	pub fn get_or_capture(&self, now: Duration) -> Duration {
		*self.0.lock().get_or_insert(now)
	}

	pub fn get(&self) -> Option<Duration> {
		*self.0.lock()
	}

	pub fn reset(&self) {
		self.0.lock().take();
	}
}

/// Counts of what happened to each block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Played {
	pub scheduled: usize,
	pub dropped: usize,
}

/// Queues one asset's decoded audio in fixed-size batches.
///
/// Each block is due at `reference + offset + timestamp`. Blocks already due when their batch
/// is queued are dropped rather than played late. The next batch is queued by a timer that
/// fires `lead` before the last block of the current batch is due, so only a bounded amount
/// of audio is queued at once.
pub struct Scheduler<O: AudioOutput> {
	output: Arc<O>,
	config: SchedulerConfig,
	reference: Reference,

	// Where the asset starts on the timeline.
	offset: Duration,
}

impl<O: AudioOutput> Scheduler<O> {
	pub fn new(output: Arc<O>, config: SchedulerConfig, reference: Reference) -> Self {
		Self {
			output,
			config,
			reference,
			offset: Duration::ZERO,
		}
	}

	pub fn with_offset(mut self, offset: Duration) -> Self {
		self.offset = offset;
		self
	}

	/// Queue every block, returning once the last batch is queued.
	pub async fn play(&self, data: &AudioBlockSet) -> Played {
		let mut played = Played::default();
		let batch = self.config.batch.max(1);
		let total = data.blocks();
		let mut index = 0;

		while index < total {
			let end = (index + batch).min(total);
			let reference = self.reference.get_or_capture(self.output.now());

			for i in index..end {
				let (Some(timestamp), Some(channels)) = (data.timestamp(i), data.block(i)) else {
					continue;
				};

				let at = reference + self.offset + Duration::from(timestamp);
				let now = self.output.now();

				if at < now {
					tracing::trace!(index = i, ?at, ?now, "dropping late audio");
					played.dropped += 1;
					continue;
				}

				let cue = Cue {
					index: i,
					timestamp,
					sample_rate: data.sample_rate,
					channels,
				};

				self.output.start(cue, at);
				played.scheduled += 1;
			}

			tracing::debug!(start = index, end, ?played, "queued audio batch");
			index = end;

			if index >= total {
				break;
			}

			// Wake up shortly before the last queued block is due.
			let Some(last) = data.timestamp(end - 1) else {
				break;
			};

			let due = self.offset + Duration::from(last);
			let elapsed = self.output.now().saturating_sub(reference);
			let wait = due.saturating_sub(elapsed).saturating_sub(self.config.lead);

			tokio::time::sleep(wait).await;
		}

		played
	}
}
