use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Logging configuration, meant to be flattened into a binary's arguments.
///
/// `RUST_LOG` takes precedence over the level when set.
#[derive(Clone, Debug, clap::Args)]
pub struct Log {
	/// The default log level.
	#[arg(id = "log-level", long = "log-level", env = "DIRECTOR_LOG_LEVEL", default_value = "info")]
	pub level: tracing::Level,
}

impl Default for Log {
	fn default() -> Self {
		Self::new(tracing::Level::INFO)
	}
}

impl Log {
	pub fn new(level: tracing::Level) -> Self {
		Self { level }
	}

	/// Install the global subscriber, writing to stderr.
	///
	/// Does nothing if a subscriber was already installed.
	pub fn init(&self) {
		let filter = EnvFilter::builder()
			.with_default_directive(LevelFilter::from_level(self.level).into())
			.from_env_lossy();

		let res = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.try_init();

		if res.is_err() {
			tracing::debug!("subscriber already installed");
		}
	}
}
