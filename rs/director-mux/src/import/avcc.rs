use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// The parameter sets needed to build an AVCDecoderConfigurationRecord.
///
/// The encoded record is what decoders expect as their description/extradata.
/// Only the fields shared by every profile are written; the high profile chroma extension is omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDescription {
	pub version: u8,
	pub profile: u8,
	pub compatibility: u8,
	pub level: u8,

	/// NAL unit length prefix size in bytes, 1 to 4.
	pub length_size: u8,

	pub sps: Vec<Bytes>,
	pub pps: Vec<Bytes>,
}

impl AvcDescription {
	/// The encoded size in bytes.
	pub fn size(&self) -> usize {
		let sets = |sets: &[Bytes]| sets.iter().map(|set| 2 + set.len()).sum::<usize>();
		7 + sets(&self.sps) + sets(&self.pps)
	}

	pub fn encode(&self) -> Result<Bytes> {
		if !(1..=4).contains(&self.length_size) {
			return Err(Error::parse(format!("invalid NAL length size: {}", self.length_size)));
		}

		// Only 5 bits are available for the SPS count.
		if self.sps.len() > 0x1f {
			return Err(Error::parse(format!("too many SPS: {}", self.sps.len())));
		}

		let pps_count = u8::try_from(self.pps.len()).map_err(|_| Error::parse("too many PPS"))?;

		let mut buf = BytesMut::with_capacity(self.size());
		buf.put_u8(self.version);
		buf.put_u8(self.profile);
		buf.put_u8(self.compatibility);
		buf.put_u8(self.level);
		buf.put_u8(0xfc | (self.length_size - 1));

		buf.put_u8(0xe0 | self.sps.len() as u8);
		for sps in &self.sps {
			put_set(&mut buf, sps)?;
		}

		buf.put_u8(pps_count);
		for pps in &self.pps {
			put_set(&mut buf, pps)?;
		}

		Ok(buf.freeze())
	}
}

impl From<&mp4_atom::Avcc> for AvcDescription {
	fn from(avcc: &mp4_atom::Avcc) -> Self {
		Self {
			version: avcc.configuration_version,
			profile: avcc.avc_profile_indication,
			compatibility: avcc.profile_compatibility,
			level: avcc.avc_level_indication,
			length_size: avcc.length_size,
			sps: avcc.sequence_parameter_sets.iter().cloned().map(Bytes::from).collect(),
			pps: avcc.picture_parameter_sets.iter().cloned().map(Bytes::from).collect(),
		}
	}
}

fn put_set(buf: &mut BytesMut, set: &[u8]) -> Result<()> {
	let size = u16::try_from(set.len()).map_err(|_| Error::parse("parameter set too large"))?;
	buf.put_u16(size);
	buf.put_slice(set);
	Ok(())
}
