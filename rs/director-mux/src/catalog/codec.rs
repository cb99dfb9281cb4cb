use std::{fmt, str::FromStr};

/// Parameters of an H.264 stream, as found in the avcC record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct H264 {
	pub profile: u8,
	pub constraints: u8,
	pub level: u8,
}

impl fmt::Display for H264 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "avc1.{:02x}{:02x}{:02x}", self.profile, self.constraints, self.level)
	}
}

impl FromStr for H264 {
	type Err = CodecError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let hex = s
			.strip_prefix("avc1.")
			.or_else(|| s.strip_prefix("avc3."))
			.ok_or_else(|| CodecError(s.to_string()))?;

		if hex.len() != 6 {
			return Err(CodecError(s.to_string()));
		}

		let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| CodecError(s.to_string()));

		Ok(Self {
			profile: byte(0)?,
			constraints: byte(2)?,
			level: byte(4)?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid codec string: {0}")]
pub struct CodecError(pub String);

/// The supported video codecs.
///
/// Only parameter-set based codecs are supported; their decoder description is synthesized from SPS/PPS.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum VideoCodec {
	H264(H264),
}

impl fmt::Display for VideoCodec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::H264(h264) => h264.fmt(f),
		}
	}
}

impl FromStr for VideoCodec {
	type Err = CodecError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		H264::from_str(s).map(Self::H264)
	}
}

/// The supported audio codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
	/// AAC with the given audio object type.
	Aac { profile: u8 },
	Opus,
}

impl fmt::Display for AudioCodec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Aac { profile } => write!(f, "mp4a.40.{profile}"),
			Self::Opus => write!(f, "opus"),
		}
	}
}

impl FromStr for AudioCodec {
	type Err = CodecError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s == "opus" {
			return Ok(Self::Opus);
		}

		s.strip_prefix("mp4a.40.")
			.and_then(|profile| profile.parse().ok())
			.map(|profile| Self::Aac { profile })
			.ok_or_else(|| CodecError(s.to_string()))
	}
}
