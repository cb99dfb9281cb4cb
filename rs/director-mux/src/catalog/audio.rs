use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, hex::Hex};

use super::AudioCodec;

/// Audio decoder configuration, shaped like a WebCodecs AudioDecoderConfig.
#[serde_with::serde_as]
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
	#[serde_as(as = "DisplayFromStr")]
	pub codec: AudioCodec,

	pub sample_rate: u32,

	#[serde(rename = "numberOfChannels")]
	pub channel_count: u32,

	/// Ticks per second of the track, needed to convert chunk timestamps.
	pub timescale: u64,

	// Codec specific setup, ex. the AudioSpecificConfig for AAC.
	#[serde(default)]
	#[serde_as(as = "Option<Hex>")]
	pub description: Option<Bytes>,
}
