//! Small MP4 files built in memory.
//!
//! The video track is H.264 at 30 fps with a keyframe every `gop` frames, the audio track is
//! 20ms Opus packets. Payloads are deterministic so tests can compare them.
use bytes::{BufMut, Bytes, BytesMut};

pub const SPS: &[u8] = &[
	0x67, 0x42, 0xc0, 0x1e, 0xd9, 0x00, 0xa0, 0x3d, 0xa1, 0x00, 0x00, 0x03, 0x00, 0x01, 0x00, 0x00, 0x03,
];
pub const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80, 0x00];

pub const VIDEO_TIMESCALE: u32 = 30_000;
pub const VIDEO_DELTA: u32 = 1000;
pub const AUDIO_TIMESCALE: u32 = 48_000;
pub const AUDIO_DELTA: u32 = 960;

const VIDEO_TRACK: u32 = 1;
const AUDIO_TRACK: u32 = 2;

#[derive(Debug, Clone)]
pub struct Fixture {
	/// Number of video frames, 0 for no video track.
	pub video_frames: u32,
	pub gop: u32,

	/// Include an audio track.
	pub audio: bool,
	pub audio_frames: u32,

	/// Include SPS/PPS in the avcC box.
	pub parameter_sets: bool,

	/// Place the moov before the mdat.
	pub moov_first: bool,
}

impl Default for Fixture {
	fn default() -> Self {
		Self {
			video_frames: 30,
			gop: 10,
			audio: true,
			audio_frames: 50,
			parameter_sets: true,
			moov_first: true,
		}
	}
}

impl Fixture {
	pub fn video_payload(&self, index: u32) -> Bytes {
		let size = 8 + index % 7;
		let nal = if index % self.gop == 0 { 0x65 } else { 0x41 };

		let mut buf = BytesMut::new();
		buf.put_u32(size - 4);
		buf.put_u8(nal);
		buf.put_bytes(index as u8, size as usize - 5);
		buf.freeze()
	}

	pub fn audio_payload(&self, index: u32) -> Bytes {
		let mut buf = BytesMut::new();
		buf.put_u8(0xfc);
		buf.put_u16(index as u16);
		buf.put_bytes(0x55, 1 + index as usize % 3);
		buf.freeze()
	}

	pub fn encode(&self) -> Bytes {
		let ftyp = self.ftyp();

		// Interleave one video and one audio sample at a time.
		let mut mdat = BytesMut::new();
		let mut video = Vec::new();
		let mut audio = Vec::new();

		let audio_frames = if self.audio { self.audio_frames } else { 0 };
		for index in 0..self.video_frames.max(audio_frames) {
			if index < self.video_frames {
				video.push(mdat.len() as u64);
				mdat.extend_from_slice(&self.video_payload(index));
			}
			if index < audio_frames {
				audio.push(mdat.len() as u64);
				mdat.extend_from_slice(&self.audio_payload(index));
			}
		}

		let mdat = atom(b"mdat", |buf| buf.extend_from_slice(&mdat));

		// The moov size doesn't depend on the offsets, so measure it first.
		let moov_size = self.moov(&video, &audio).len() as u64;
		let payload = ftyp.len() as u64 + if self.moov_first { moov_size } else { 0 } + 8;

		let video: Vec<u64> = video.iter().map(|offset| offset + payload).collect();
		let audio: Vec<u64> = audio.iter().map(|offset| offset + payload).collect();
		let moov = self.moov(&video, &audio);

		let mut file = BytesMut::new();
		file.extend_from_slice(&ftyp);
		if self.moov_first {
			file.extend_from_slice(&moov);
			file.extend_from_slice(&mdat);
		} else {
			file.extend_from_slice(&mdat);
			file.extend_from_slice(&moov);
		}

		file.freeze()
	}

	fn ftyp(&self) -> Bytes {
		atom(b"ftyp", |buf| {
			buf.put_slice(b"isom");
			buf.put_u32(0x200);
			buf.put_slice(b"isom");
			buf.put_slice(b"avc1");
		})
	}

	fn moov(&self, video: &[u64], audio: &[u64]) -> Bytes {
		atom(b"moov", |buf| {
			buf.put_slice(&full(b"mvhd", 0, 0, |buf| {
				buf.put_u32(0); // creation
				buf.put_u32(0); // modification
				buf.put_u32(1000);
				buf.put_u32(self.video_frames * VIDEO_DELTA / 30);
				buf.put_u32(0x0001_0000); // rate
				buf.put_u16(0x0100); // volume
				buf.put_bytes(0, 10);
				put_matrix(buf);
				buf.put_bytes(0, 24);
				buf.put_u32(3);
			}));

			if self.video_frames > 0 {
				buf.put_slice(&self.video_trak(video));
			}

			if self.audio {
				buf.put_slice(&self.audio_trak(audio));
			}
		})
	}

	fn video_trak(&self, offsets: &[u64]) -> Bytes {
		let frames = self.video_frames;
		let duration = frames * VIDEO_DELTA;

		let avc1 = atom(b"avc1", |buf| {
			buf.put_bytes(0, 6);
			buf.put_u16(1); // data reference index
			buf.put_bytes(0, 16);
			buf.put_u16(320);
			buf.put_u16(240);
			buf.put_u32(0x0048_0000);
			buf.put_u32(0x0048_0000);
			buf.put_u32(0);
			buf.put_u16(1); // frame count
			buf.put_bytes(0, 32); // compressor name
			buf.put_u16(0x0018);
			buf.put_i16(-1);

			buf.put_slice(&atom(b"avcC", |buf| {
				buf.put_slice(&[1, 0x42, 0xc0, 0x1e, 0xff]);
				if self.parameter_sets {
					buf.put_u8(0xe1);
					buf.put_u16(SPS.len() as u16);
					buf.put_slice(SPS);
					buf.put_u8(1);
					buf.put_u16(PPS.len() as u16);
					buf.put_slice(PPS);
				} else {
					buf.put_u8(0xe0);
					buf.put_u8(0);
				}
			}));
		});

		let sizes: Vec<u32> = (0..frames).map(|i| self.video_payload(i).len() as u32).collect();
		let sync: Vec<u32> = (0..frames).step_by(self.gop as usize).map(|i| i + 1).collect();

		let vmhd = full(b"vmhd", 0, 1, |buf| buf.put_bytes(0, 8));
		let stbl = stbl(&avc1, (frames, VIDEO_DELTA), Some(&sync), &sizes, offsets);

		trak(
			VIDEO_TRACK,
			VIDEO_TIMESCALE,
			duration,
			b"vide",
			"VideoHandler",
			(320, 240),
			&vmhd,
			&stbl,
		)
	}

	fn audio_trak(&self, offsets: &[u64]) -> Bytes {
		let frames = self.audio_frames;
		let duration = frames * AUDIO_DELTA;

		let opus = atom(b"Opus", |buf| {
			buf.put_bytes(0, 6);
			buf.put_u16(1); // data reference index
			buf.put_bytes(0, 8);
			buf.put_u16(2); // channels
			buf.put_u16(16); // sample size
			buf.put_u32(0);
			buf.put_u32(AUDIO_TIMESCALE << 16);

			buf.put_slice(&atom(b"dOps", |buf| {
				buf.put_u8(0);
				buf.put_u8(2);
				buf.put_u16(312); // pre-skip
				buf.put_u32(AUDIO_TIMESCALE);
				buf.put_i16(0);
				buf.put_u8(0);
			}));
		});

		let sizes: Vec<u32> = (0..frames).map(|i| self.audio_payload(i).len() as u32).collect();

		let smhd = full(b"smhd", 0, 0, |buf| buf.put_u32(0));
		let stbl = stbl(&opus, (frames, AUDIO_DELTA), None, &sizes, offsets);

		trak(
			AUDIO_TRACK,
			AUDIO_TIMESCALE,
			duration,
			b"soun",
			"SoundHandler",
			(0, 0),
			&smhd,
			&stbl,
		)
	}
}

#[allow(clippy::too_many_arguments)]
fn trak(
	id: u32,
	timescale: u32,
	duration: u32,
	handler: &[u8; 4],
	name: &str,
	(width, height): (u32, u32),
	media_header: &[u8],
	stbl: &[u8],
) -> Bytes {
	atom(b"trak", |buf| {
		buf.put_slice(&full(b"tkhd", 0, 3, |buf| {
			buf.put_u32(0); // creation
			buf.put_u32(0); // modification
			buf.put_u32(id);
			buf.put_u32(0);
			buf.put_u32(duration * 1000 / timescale);
			buf.put_bytes(0, 8);
			buf.put_u16(0); // layer
			buf.put_u16(0); // alternate group
			buf.put_u16(if handler == b"soun" { 0x0100 } else { 0 });
			buf.put_u16(0);
			put_matrix(buf);
			buf.put_u32(width << 16);
			buf.put_u32(height << 16);
		}));

		buf.put_slice(&atom(b"mdia", |buf| {
			buf.put_slice(&full(b"mdhd", 0, 0, |buf| {
				buf.put_u32(0); // creation
				buf.put_u32(0); // modification
				buf.put_u32(timescale);
				buf.put_u32(duration);
				buf.put_u16(0x55c4); // und
				buf.put_u16(0);
			}));

			buf.put_slice(&full(b"hdlr", 0, 0, |buf| {
				buf.put_u32(0);
				buf.put_slice(handler);
				buf.put_bytes(0, 12);
				buf.put_slice(name.as_bytes());
				buf.put_u8(0);
			}));

			buf.put_slice(&atom(b"minf", |buf| {
				buf.put_slice(media_header);
				buf.put_slice(&atom(b"dinf", |buf| {
					buf.put_slice(&full(b"dref", 0, 0, |buf| {
						buf.put_u32(1);
						buf.put_slice(&full(b"url ", 0, 1, |_| {}));
					}));
				}));
				buf.put_slice(stbl);
			}));
		}));
	})
}

fn stbl(entry: &[u8], (count, delta): (u32, u32), sync: Option<&[u32]>, sizes: &[u32], offsets: &[u64]) -> Bytes {
	atom(b"stbl", |buf| {
		buf.put_slice(&full(b"stsd", 0, 0, |buf| {
			buf.put_u32(1);
			buf.put_slice(entry);
		}));

		buf.put_slice(&full(b"stts", 0, 0, |buf| {
			buf.put_u32(1);
			buf.put_u32(count);
			buf.put_u32(delta);
		}));

		if let Some(sync) = sync {
			buf.put_slice(&full(b"stss", 0, 0, |buf| {
				buf.put_u32(sync.len() as u32);
				for &number in sync {
					buf.put_u32(number);
				}
			}));
		}

		// One sample per chunk.
		buf.put_slice(&full(b"stsc", 0, 0, |buf| {
			buf.put_u32(1);
			buf.put_u32(1);
			buf.put_u32(1);
			buf.put_u32(1);
		}));

		buf.put_slice(&full(b"stsz", 0, 0, |buf| {
			buf.put_u32(0);
			buf.put_u32(sizes.len() as u32);
			for &size in sizes {
				buf.put_u32(size);
			}
		}));

		buf.put_slice(&full(b"stco", 0, 0, |buf| {
			buf.put_u32(offsets.len() as u32);
			for &offset in offsets {
				buf.put_u32(offset as u32);
			}
		}));
	})
}

fn put_matrix(buf: &mut BytesMut) {
	for value in [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000u32] {
		buf.put_u32(value);
	}
}

fn atom(kind: &[u8; 4], body: impl FnOnce(&mut BytesMut)) -> Bytes {
	let mut buf = BytesMut::new();
	buf.put_u32(0);
	buf.put_slice(kind);
	body(&mut buf);

	let size = buf.len() as u32;
	buf[..4].copy_from_slice(&size.to_be_bytes());
	buf.freeze()
}

fn full(kind: &[u8; 4], version: u8, flags: u32, body: impl FnOnce(&mut BytesMut)) -> Bytes {
	atom(kind, |buf| {
		buf.put_u32((version as u32) << 24 | flags);
		body(buf);
	})
}
