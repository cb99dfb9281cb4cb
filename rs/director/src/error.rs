use crate::decode::DecodeError;

#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	#[error("demux error: {0}")]
	Demux(#[from] director_mux::Error),

	#[error("decode error: {0}")]
	Decode(#[from] DecodeError),

	/// Rendering or buffering was requested before the movie finished loading.
	#[error("not loaded")]
	NotLoaded,

	/// Some assets failed to load; the rest of the movie is still playable.
	#[error("failed to load: {}", .0.join(", "))]
	Load(Vec<String>),

	#[error("invalid movie: {0}")]
	Movie(String),
}

pub type Result<T> = std::result::Result<T, Error>;
