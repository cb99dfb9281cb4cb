use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use mp4_atom::{Any, DecodeMaybe, Moof, Moov, Trak};

use super::{AvcDescription, Sample, SampleTable};
use crate::catalog::{AudioCodec, AudioConfig, H264, TrackInfo, TrackKind, VideoConfig, frame_rate};
use crate::{Chunk, ChunkKind, Error, Result};

/// The parsed `moov`: the first video and first audio track of the file.
#[derive(Debug, Clone)]
pub struct Header {
	pub video: Option<VideoTrack>,
	pub audio: Option<AudioTrack>,

	/// The file is fragmented, so sample counts aren't known up front.
	pub fragmented: bool,
}

impl Header {
	pub fn track(&self, kind: TrackKind) -> Option<&TrackInfo> {
		match kind {
			TrackKind::Video => self.video.as_ref().map(|video| &video.info),
			TrackKind::Audio => self.audio.as_ref().map(|audio| &audio.info),
		}
	}
}

#[derive(Debug, Clone)]
pub struct VideoTrack {
	pub info: TrackInfo,
	pub config: VideoConfig,
}

#[derive(Debug, Clone)]
pub struct AudioTrack {
	pub info: TrackInfo,
	pub config: AudioConfig,
}

/// Output of [`Mp4::append`].
#[derive(Debug, Clone)]
pub enum Event {
	Header(Arc<Header>),
	Chunk(TrackKind, Chunk),
}

// A top-level box header.
struct Atom {
	kind: [u8; 4],
	// None when the box extends to the end of the file.
	size: Option<u64>,
	header: u64,
}

// Samples of a track still waiting for their bytes.
struct Pending {
	id: u32,
	kind: TrackKind,
	samples: VecDeque<Sample>,

	// The number and decode time of the next fragmented sample.
	count: u64,
	dts: u64,
}

/// An incremental MP4 parser.
///
/// Buffers are appended with their absolute file offset. Samples are emitted as soon as
/// their bytes are resident, and bytes that no remaining sample needs are dropped, so `mdat`
/// is never buffered whole. The exception is a file whose `moov` comes after its `mdat`:
/// nothing can be located until the sample tables arrive.
///
/// Both progressive (`moov` + `mdat`) and fragmented (`moof` + `mdat`) files are supported.
pub struct Mp4 {
	// Bytes starting at absolute offset `base`.
	buffer: BytesMut,
	base: u64,

	// The absolute offset of the next top-level box.
	position: u64,

	// The first mdat seen before the moov; retained until the header arrives.
	retain: Option<u64>,

	header: Option<Arc<Header>>,
	moov: Option<Moov>,

	// The latest moof and its absolute offset, waiting for the following mdat.
	moof: Option<(Moof, u64)>,

	pending: Vec<Pending>,
}

impl Default for Mp4 {
	fn default() -> Self {
		Self::new()
	}
}

impl Mp4 {
	pub fn new() -> Self {
		Self {
			buffer: BytesMut::new(),
			base: 0,
			position: 0,
			retain: None,
			header: None,
			moov: None,
			moof: None,
			pending: Vec::new(),
		}
	}

	pub fn header(&self) -> Option<&Arc<Header>> {
		self.header.as_ref()
	}

	/// The absolute offset one past the last received byte.
	pub fn received(&self) -> u64 {
		self.base + self.buffer.len() as u64
	}

	/// The number of bytes currently held.
	pub fn buffered(&self) -> usize {
		self.buffer.len()
	}

	/// Append the next buffer of the file, which must start where the previous one ended.
	pub fn append(&mut self, offset: u64, data: &[u8]) -> Result<Vec<Event>> {
		if offset != self.received() {
			return Err(Error::parse(format!(
				"non-contiguous append: expected offset {}, got {}",
				self.received(),
				offset
			)));
		}

		self.buffer.extend_from_slice(data);

		let mut events = Vec::new();
		self.parse(&mut events)?;
		self.discard();

		Ok(events)
	}

	/// Signal the end of the file.
	///
	/// Returns the number of samples that were declared but never received.
	pub fn finish(&mut self) -> Result<u64> {
		if self.header.is_none() {
			return Err(Error::parse("missing moov box"));
		}

		if let Some((_, offset)) = self.moof.take() {
			tracing::warn!(offset, "moof without mdat");
		}

		let missing = self.pending.iter().map(|pending| pending.samples.len() as u64).sum();
		for pending in &mut self.pending {
			pending.samples.clear();
		}

		Ok(missing)
	}

	fn parse(&mut self, events: &mut Vec<Event>) -> Result<()> {
		loop {
			self.emit(events);

			let Some(atom) = self.peek()? else {
				return Ok(());
			};

			match &atom.kind {
				b"moov" | b"moof" => {
					let size = atom.size.ok_or_else(|| Error::parse("unbounded moov/moof box"))?;
					let end = self.position.checked_add(size).ok_or_else(|| Error::parse("box size overflow"))?;
					if self.received() < end {
						// Wait for the rest of the box.
						return Ok(());
					}

					let start = (self.position - self.base) as usize;
					let mut cursor = std::io::Cursor::new(&self.buffer[start..start + size as usize]);
					let decoded = Any::decode_maybe(&mut cursor)?;

					match decoded {
						Some(Any::Moov(moov)) => {
							let header = self.init(moov)?;
							events.push(Event::Header(header));
						}
						Some(Any::Moof(moof)) => {
							if self.moof.is_some() {
								return Err(Error::parse("duplicate moof box"));
							}
							self.moof = Some((moof, self.position));
						}
						_ => return Err(Error::parse("truncated box")),
					}
				}
				b"mdat" => {
					let payload = self.position + atom.header;

					if self.header.is_none() && self.retain.is_none() {
						self.retain = Some(self.position);
					}

					if let Some((moof, offset)) = self.moof.take() {
						self.fragment(&moof, offset, payload)?;
					}
				}
				kind => {
					tracing::trace!(kind = ?String::from_utf8_lossy(kind), size = ?atom.size, "skipping box");
				}
			}

			self.position = match atom.size {
				Some(size) => self
					.position
					.checked_add(size)
					.ok_or_else(|| Error::parse("box size overflow"))?,
				None => u64::MAX,
			};
		}
	}

	// Read the box header at the current position, if it's resident.
	fn peek(&self) -> Result<Option<Atom>> {
		let Ok(start) = usize::try_from(self.position - self.base) else {
			return Ok(None);
		};

		let Some(mut buf) = self.buffer.get(start..) else {
			return Ok(None);
		};

		if buf.len() < 8 {
			return Ok(None);
		}

		let size = buf.get_u32();
		let mut kind = [0u8; 4];
		buf.copy_to_slice(&mut kind);

		let (size, header) = match size {
			0 => (None, 8),
			1 => {
				if buf.len() < 8 {
					return Ok(None);
				}
				(Some(buf.get_u64()), 16)
			}
			size => (Some(size as u64), 8),
		};

		if let Some(size) = size.filter(|&size| size < header) {
			return Err(Error::parse(format!("invalid box size: {size}")));
		}

		Ok(Some(Atom { kind, size, header }))
	}

	fn init(&mut self, moov: Moov) -> Result<Arc<Header>> {
		if self.header.is_some() {
			return Err(Error::parse("duplicate moov box"));
		}

		let fragmented = moov.mvex.is_some();
		let mut video = None;
		let mut audio = None;

		for trak in &moov.trak {
			let id = trak.tkhd.track_id;

			let kind = match trak.mdia.hdlr.handler.as_ref() {
				b"vide" if video.is_none() => TrackKind::Video,
				b"soun" if audio.is_none() => TrackKind::Audio,
				handler => {
					tracing::debug!(track = id, handler = ?String::from_utf8_lossy(handler), "ignoring track");
					continue;
				}
			};

			let table = SampleTable::try_from(&trak.mdia.minf.stbl)?;
			let samples = table.samples()?;

			let info = TrackInfo {
				id,
				timescale: trak.mdia.mdhd.timescale as u64,
				sample_count: samples.len() as u64,
				duration: trak.mdia.mdhd.duration,
			};

			match kind {
				TrackKind::Video => {
					let (duration, count) = match table.is_empty() {
						true => (default_duration(&moov, id), 1),
						false => (table.duration(), table.len() as u64),
					};

					let config = init_video(trak, info.timescale, duration, count)?;
					tracing::debug!(track = id, ?config, samples = info.sample_count, "starting video track");

					video = Some(VideoTrack { info, config });
				}
				TrackKind::Audio => {
					let config = init_audio(trak, info.timescale)?;
					tracing::debug!(track = id, ?config, samples = info.sample_count, "starting audio track");

					audio = Some(AudioTrack { info, config });
				}
			}

			self.pending.push(Pending {
				id,
				kind,
				count: samples.len() as u64,
				dts: samples.last().map(|s| s.dts + s.duration as u64).unwrap_or_default(),
				samples: samples.into(),
			});
		}

		let header = Arc::new(Header {
			video,
			audio,
			fragmented,
		});

		self.header = Some(header.clone());
		self.moov = Some(moov);
		self.retain = None;

		Ok(header)
	}

	// Locate the samples of a moof, now that the following mdat is known.
	fn fragment(&mut self, moof: &Moof, moof_offset: u64, payload: u64) -> Result<()> {
		let moov = self.moov.as_ref().ok_or_else(|| Error::parse("moof before moov"))?;

		for traf in &moof.traf {
			let tfhd = &traf.tfhd;

			let Some(pending) = self.pending.iter_mut().find(|pending| pending.id == tfhd.track_id) else {
				tracing::trace!(track = tfhd.track_id, "skipping fragment of ignored track");
				continue;
			};

			let trex = moov
				.mvex
				.as_ref()
				.and_then(|mvex| mvex.trex.iter().find(|trex| trex.track_id == tfhd.track_id));

			// The moov contains some defaults
			let default_sample_duration = trex.map(|trex| trex.default_sample_duration).unwrap_or_default();
			let default_sample_size = trex.map(|trex| trex.default_sample_size).unwrap_or_default();
			let default_sample_flags = trex.map(|trex| trex.default_sample_flags).unwrap_or_default();

			let mut dts = traf
				.tfdt
				.as_ref()
				.map(|tfdt| tfdt.base_media_decode_time)
				.unwrap_or(pending.dts);

			// Data offsets are relative to the moof unless the tfhd says otherwise.
			let base = tfhd.base_data_offset.unwrap_or(moof_offset);
			let mut offset = payload;

			for trun in &traf.trun {
				if let Some(data_offset) = trun.data_offset {
					offset = base
						.checked_add_signed(data_offset as i64)
						.ok_or_else(|| Error::parse("invalid data offset"))?;
				}

				for entry in &trun.entries {
					let flags = entry
						.flags
						.unwrap_or(tfhd.default_sample_flags.unwrap_or(default_sample_flags));
					let duration = entry
						.duration
						.unwrap_or(tfhd.default_sample_duration.unwrap_or(default_sample_duration));
					let size = entry
						.size
						.unwrap_or(tfhd.default_sample_size.unwrap_or(default_sample_size));

					let sync = match pending.kind {
						TrackKind::Video => {
							let depends_on_none = (flags >> 24) & 0x3 == 0x2;
							let non_sync = (flags >> 16) & 0x1 == 0x1;
							depends_on_none && !non_sync
						}
						TrackKind::Audio => true,
					};

					pending.samples.push_back(Sample {
						number: pending.count,
						offset,
						size,
						dts,
						cts: dts.saturating_add_signed(entry.cts.unwrap_or_default() as i64),
						duration,
						sync,
					});

					pending.count += 1;
					dts = dts.saturating_add(duration as u64);
					offset = offset
						.checked_add(size as u64)
						.ok_or_else(|| Error::parse("sample offset overflow"))?;
				}
			}

			pending.dts = dts;
		}

		Ok(())
	}

	// Emit every resident sample, lowest offset first.
	fn emit(&mut self, events: &mut Vec<Event>) {
		let received = self.received();

		for pending in &mut self.pending {
			while let Some(sample) = pending.samples.front().filter(|sample| sample.offset < self.base) {
				tracing::warn!(track = pending.id, number = sample.number, "sample data already discarded");
				pending.samples.pop_front();
			}
		}

		loop {
			let next = self
				.pending
				.iter()
				.enumerate()
				.filter_map(|(index, pending)| Some((index, pending.samples.front()?)))
				.filter(|(_, sample)| sample.end() <= received)
				.min_by_key(|(_, sample)| sample.offset)
				.map(|(index, _)| index);

			let Some(index) = next else {
				return;
			};

			let pending = &mut self.pending[index];
			let Some(sample) = pending.samples.pop_front() else {
				return;
			};

			let start = (sample.offset - self.base) as usize;
			let payload = Bytes::copy_from_slice(&self.buffer[start..start + sample.size as usize]);

			let chunk = Chunk {
				kind: if sample.sync { ChunkKind::Key } else { ChunkKind::Delta },
				timestamp: sample.cts,
				duration: sample.duration as u64,
				payload,
			};

			events.push(Event::Chunk(pending.kind, chunk));
		}
	}

	// Drop every byte that neither the next box nor a pending sample needs.
	fn discard(&mut self) {
		let mut keep = self.position.min(self.received());

		if let Some(retain) = self.retain {
			keep = keep.min(retain);
		}

		for pending in &self.pending {
			if let Some(sample) = pending.samples.front() {
				keep = keep.min(sample.offset);
			}
		}

		if keep > self.base {
			self.buffer.advance((keep - self.base) as usize);
			self.base = keep;
		}
	}
}

fn default_duration(moov: &Moov, track_id: u32) -> u64 {
	moov.mvex
		.as_ref()
		.and_then(|mvex| mvex.trex.iter().find(|trex| trex.track_id == track_id))
		.map(|trex| trex.default_sample_duration as u64)
		.unwrap_or_default()
}

fn codec(trak: &Trak) -> Result<&mp4_atom::Codec> {
	let stsd = &trak.mdia.minf.stbl.stsd;

	match stsd.codecs.len() {
		0 => Err(Error::parse("missing codec")),
		1 => Ok(&stsd.codecs[0]),
		_ => Err(Error::UnsupportedCodec("multiple codecs".to_string())),
	}
}

fn init_video(trak: &Trak, timescale: u64, duration: u64, samples: u64) -> Result<VideoConfig> {
	let avc1 = match codec(trak)? {
		mp4_atom::Codec::Avc1(avc1) => avc1,
		unsupported => return Err(Error::UnsupportedCodec(format!("{unsupported:?}"))),
	};

	let avcc = &avc1.avcc;
	if avcc.sequence_parameter_sets.is_empty() || avcc.picture_parameter_sets.is_empty() {
		return Err(Error::MissingParameterSets(trak.tkhd.track_id));
	}

	let description = AvcDescription::from(avcc).encode()?;
	let (frame_duration, fps) = frame_rate(timescale, duration, samples);

	Ok(VideoConfig {
		codec: H264 {
			profile: avcc.avc_profile_indication,
			constraints: avcc.profile_compatibility,
			level: avcc.avc_level_indication,
		}
		.into(),
		coded_width: avc1.visual.width as _,
		coded_height: avc1.visual.height as _,
		description,
		timescale,
		frame_duration,
		fps,
	})
}

fn init_audio(trak: &Trak, timescale: u64) -> Result<AudioConfig> {
	let config = match codec(trak)? {
		mp4_atom::Codec::Mp4a(mp4a) => {
			let desc = &mp4a.esds.es_desc.dec_config;

			if desc.object_type_indication != 0x40 {
				return Err(Error::UnsupportedCodec(format!(
					"mp4a object type {:#x}",
					desc.object_type_indication
				)));
			}

			AudioConfig {
				codec: AudioCodec::Aac {
					profile: desc.dec_specific.profile,
				},
				sample_rate: mp4a.audio.sample_rate.integer() as _,
				channel_count: mp4a.audio.channel_count as _,
				timescale,
				description: Some(audio_specific_config(
					&desc.dec_specific,
					mp4a.audio.sample_rate.integer() as u32,
				)),
			}
		}
		mp4_atom::Codec::Opus(opus) => AudioConfig {
			codec: AudioCodec::Opus,
			sample_rate: opus.audio.sample_rate.integer() as _,
			channel_count: opus.audio.channel_count as _,
			timescale,
			description: None,
		},
		unsupported => return Err(Error::UnsupportedCodec(format!("{unsupported:?}"))),
	};

	Ok(config)
}

// Rebuild the AudioSpecificConfig from the parsed esds fields.
//
// Profiles past 30 use the escape code. A frequency index of 15 means the rate is written out.
fn audio_specific_config(specific: &mp4_atom::esds::DecoderSpecific, sample_rate: u32) -> Bytes {
	let mut bits = BitWriter::default();

	match specific.profile {
		profile @ 0..31 => bits.put(profile as u64, 5),
		profile => {
			bits.put(31, 5);
			bits.put(profile.saturating_sub(32) as u64, 6);
		}
	}

	bits.put(specific.freq_index as u64, 4);
	if specific.freq_index == 15 {
		bits.put(sample_rate as u64, 24);
	}

	bits.put(specific.chan_conf as u64, 4);
	bits.finish()
}

#[derive(Default)]
struct BitWriter {
	value: u64,
	len: u32,
}

impl BitWriter {
	fn put(&mut self, value: u64, width: u32) {
		self.value = (self.value << width) | (value & ((1 << width) - 1));
		self.len += width;
	}

	// Zero pad to a whole byte.
	fn finish(self) -> Bytes {
		let bytes = self.len.div_ceil(8);
		let value = self.value << (bytes * 8 - self.len);
		Bytes::copy_from_slice(&value.to_be_bytes()[(8 - bytes) as usize..])
	}
}
