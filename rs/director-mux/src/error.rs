use std::sync::Arc;

/// A list of possible errors that can occur while demuxing.
///
/// The error is [`Clone`] so a single header parse can be shared by every caller waiting on it.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	/// The container is malformed or truncated.
	#[error("parse error: {0}")]
	Parse(String),

	/// A video track was declared without any SPS/PPS to build a decoder description from.
	#[error("missing parameter sets for track {0}")]
	MissingParameterSets(u32),

	#[error("unsupported codec: {0}")]
	UnsupportedCodec(String),

	#[error("unsupported url: {0}")]
	UnsupportedUrl(String),

	#[error("mp4 error: {0}")]
	Mp4(Arc<mp4_atom::Error>),

	#[error("io error: {0}")]
	Io(Arc<std::io::Error>),

	#[cfg(feature = "http")]
	#[error("http error: {0}")]
	Http(Arc<reqwest::Error>),
}

impl Error {
	pub(crate) fn parse(msg: impl Into<String>) -> Self {
		Self::Parse(msg.into())
	}
}

impl From<mp4_atom::Error> for Error {
	fn from(err: mp4_atom::Error) -> Self {
		Self::Mp4(Arc::new(err))
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(Arc::new(err))
	}
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Self::Http(Arc::new(err))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
