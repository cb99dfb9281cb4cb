use std::time::Duration;

/// How many decoded frames to keep around the playback cursor.
///
/// Both values are in native frames of the asset. Every frame in the window is held decoded,
/// so memory grows with `lookback + lookahead` times the frame size.
#[derive(Clone, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct CacheConfig {
	/// Frames to keep behind the cursor.
	#[arg(id = "cache-lookback", long = "cache-lookback", env = "DIRECTOR_CACHE_LOOKBACK", default_value_t = 30)]
	pub lookback: u64,

	/// Frames to decode ahead of the cursor.
	#[arg(id = "cache-lookahead", long = "cache-lookahead", env = "DIRECTOR_CACHE_LOOKAHEAD", default_value_t = 90)]
	pub lookahead: u64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			lookback: 30,
			lookahead: 90,
		}
	}
}

/// How decoded audio is queued onto the output.
#[derive(Clone, Debug, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct SchedulerConfig {
	/// Number of decoded blocks queued per batch.
	#[arg(id = "audio-batch", long = "audio-batch", env = "DIRECTOR_AUDIO_BATCH", default_value_t = 500)]
	pub batch: usize,

	/// How long before the last queued block is due to queue the next batch.
	#[arg(
		id = "audio-lead",
		long = "audio-lead",
		env = "DIRECTOR_AUDIO_LEAD",
		default_value = "1s",
		value_parser = humantime::parse_duration,
	)]
	#[serde(with = "humantime_serde")]
	pub lead: Duration,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			batch: 500,
			lead: Duration::from_secs(1),
		}
	}
}

/// Configuration for a [`crate::pipeline::Pipeline`].
#[derive(Clone, Debug, Default, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
	#[command(flatten)]
	pub cache: CacheConfig,

	#[command(flatten)]
	pub audio: SchedulerConfig,
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[derive(Parser)]
	struct Args {
		#[command(flatten)]
		config: Config,
	}

	#[test]
	fn defaults() {
		let args = Args::try_parse_from(["director"]).unwrap();
		assert_eq!(args.config.cache.lookback, 30);
		assert_eq!(args.config.cache.lookahead, 90);
		assert_eq!(args.config.audio.batch, 500);
		assert_eq!(args.config.audio.lead, Duration::from_secs(1));
	}

	#[test]
	fn flags() {
		let args = Args::try_parse_from(["director", "--cache-lookahead", "15", "--audio-lead", "250ms"]).unwrap();
		assert_eq!(args.config.cache.lookahead, 15);
		assert_eq!(args.config.audio.lead, Duration::from_millis(250));
	}

	#[test]
	fn json() {
		let config: Config = serde_json::from_str(r#"{ "cache": { "lookback": 5 }, "audio": { "lead": "2s" } }"#).unwrap();
		assert_eq!(config.cache.lookback, 5);
		assert_eq!(config.cache.lookahead, 90);
		assert_eq!(config.audio.lead, Duration::from_secs(2));

		assert!(serde_json::from_str::<Config>(r#"{ "cache": { "window": 5 } }"#).is_err());
	}
}
