//! Software decoding with FFmpeg.
//!
//! Video is decoded to planar YUV and audio to planar PCM, one buffer per channel.
use std::sync::Arc;

use bytes::Bytes;
use director_mux::{
	Chunk,
	catalog::{AudioCodec, AudioConfig, VideoConfig},
};
use ffmpeg_next as ffmpeg;

use super::{AudioData, Backend, DecodeError, Decoder, Flushed, Picture, Release};

// Decoders may read past the end of extradata.
const PADDING: usize = 64;

/// Pixel format of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
	YUV420P,
	YUV422P,
	YUV444P,
}

impl VideoFormat {
	fn from_ffmpeg(format: ffmpeg::format::Pixel) -> Option<Self> {
		use ffmpeg::format::Pixel;
		match format {
			Pixel::YUV420P | Pixel::YUVJ420P => Some(Self::YUV420P),
			Pixel::YUV422P | Pixel::YUVJ422P => Some(Self::YUV422P),
			Pixel::YUV444P | Pixel::YUVJ444P => Some(Self::YUV444P),
			_ => None,
		}
	}
}

/// A single plane of pixel data.
#[derive(Debug, Clone)]
pub struct Plane {
	pub data: Bytes,

	/// Number of bytes between rows (may include padding).
	pub stride: usize,
}

#[derive(Debug)]
pub struct Image {
	pub format: VideoFormat,
	pub width: u32,
	pub height: u32,
	pub planes: Vec<Plane>,
}

/// A decoded picture in system memory.
#[derive(Debug, Clone)]
pub struct VideoFrame(pub Arc<Image>);

impl Release for VideoFrame {
	fn release(self) {
		drop(self)
	}
}

/// Decodes H.264 and AAC/Opus with FFmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl Backend for FfmpegBackend {
	type Frame = VideoFrame;
	type Video = VideoDecoder;
	type Audio = AudioDecoder;

	fn video(&self) -> VideoDecoder {
		VideoDecoder::default()
	}

	fn audio(&self) -> AudioDecoder {
		AudioDecoder::default()
	}
}

fn context(codec_id: ffmpeg::codec::Id, extradata: Option<&[u8]>) -> Result<ffmpeg::codec::context::Context, DecodeError> {
	ffmpeg::init().map_err(|e| DecodeError::Configure(e.to_string()))?;

	let codec =
		ffmpeg::codec::decoder::find(codec_id).ok_or_else(|| DecodeError::Unsupported(format!("{codec_id:?}")))?;

	let mut context = ffmpeg::codec::context::Context::new_with_codec(codec);

	// The description must be in place before the decoder is opened.
	if let Some(data) = extradata {
		unsafe {
			let context = context.as_mut_ptr();
			let extradata = ffmpeg::sys::av_mallocz(data.len() + PADDING) as *mut u8;
			if extradata.is_null() {
				return Err(DecodeError::Configure("failed to allocate extradata".to_string()));
			}
			std::ptr::copy_nonoverlapping(data.as_ptr(), extradata, data.len());
			(*context).extradata = extradata;
			(*context).extradata_size = data.len() as i32;
		}
	}

	Ok(context)
}

fn packet(chunk: &Chunk) -> ffmpeg::codec::packet::Packet {
	let mut packet = ffmpeg::codec::packet::Packet::copy(chunk.payload.as_ref());
	packet.set_pts(Some(chunk.timestamp as i64));
	packet
}

/// Decodes H.264 to planar YUV.
#[derive(Default)]
pub struct VideoDecoder {
	decoder: Option<ffmpeg::decoder::Video>,
	outputs: Vec<Picture<VideoFrame>>,
	errors: Vec<DecodeError>,
}

impl VideoDecoder {
	// Move every frame the decoder has ready into the output list.
	fn receive(&mut self) {
		let Some(decoder) = self.decoder.as_mut() else {
			return;
		};

		let mut decoded = ffmpeg::frame::Video::empty();
		while decoder.receive_frame(&mut decoded).is_ok() {
			let timestamp = decoded.pts().unwrap_or_default().max(0) as u64;

			let Some(format) = VideoFormat::from_ffmpeg(decoded.format()) else {
				self.errors.push(DecodeError::Unsupported(format!("pixel format {:?}", decoded.format())));
				continue;
			};

			let planes = (0..decoded.planes())
				.map(|i| Plane {
					data: Bytes::copy_from_slice(decoded.data(i)),
					stride: decoded.stride(i),
				})
				.collect();

			let image = Image {
				format,
				width: decoded.width(),
				height: decoded.height(),
				planes,
			};

			self.outputs.push(Picture {
				timestamp,
				frame: VideoFrame(Arc::new(image)),
			});
		}
	}
}

impl Decoder for VideoDecoder {
	type Config = VideoConfig;
	type Output = Picture<VideoFrame>;

	fn configure(&mut self, config: &VideoConfig) -> Result<(), DecodeError> {
		let context = context(ffmpeg::codec::Id::H264, Some(&config.description))?;
		let decoder = context
			.decoder()
			.video()
			.map_err(|e| DecodeError::Configure(format!("not a video codec: {e}")))?;

		self.decoder = Some(decoder);
		Ok(())
	}

	fn decode(&mut self, chunk: Chunk) {
		let Some(decoder) = self.decoder.as_mut() else {
			return;
		};

		if let Err(err) = decoder.send_packet(&packet(&chunk)) {
			self.errors.push(DecodeError::Chunk {
				timestamp: chunk.timestamp,
				reason: err.to_string(),
			});
		}

		self.receive();
	}

	fn flush(&mut self) -> impl Future<Output = Flushed<Self::Output>> + Send {
		if let Some(Err(err)) = self.decoder.as_mut().map(|decoder| decoder.send_eof()) {
			tracing::warn!(%err, "failed to flush video decoder");
		}

		self.receive();

		// Decoders return frames in presentation order already; this guards against B-frame quirks.
		let mut outputs = std::mem::take(&mut self.outputs);
		outputs.sort_by_key(|picture| picture.timestamp);

		std::future::ready(Flushed {
			outputs,
			errors: std::mem::take(&mut self.errors),
		})
	}

	fn close(&mut self) {
		self.decoder.take();
	}
}

/// Decodes AAC or Opus to planar PCM in the decoder's native sample format.
#[derive(Default)]
pub struct AudioDecoder {
	decoder: Option<ffmpeg::decoder::Audio>,
	outputs: Vec<AudioData>,
	errors: Vec<DecodeError>,
}

impl AudioDecoder {
	fn receive(&mut self) {
		let Some(decoder) = self.decoder.as_mut() else {
			return;
		};

		let mut decoded = ffmpeg::frame::Audio::empty();
		while decoder.receive_frame(&mut decoded).is_ok() {
			let frames = decoded.samples();
			let channels = decoded.channels() as usize;
			let size = decoded.format().bytes();

			let channels = match decoded.is_planar() {
				true => (0..channels)
					.map(|ch| Bytes::copy_from_slice(&decoded.data(ch)[..frames * size]))
					.collect(),
				false => {
					// Packed: split the interleaved samples into one buffer per channel.
					let packed = decoded.data(0);
					(0..channels)
						.map(|ch| {
							let mut plane = Vec::with_capacity(frames * size);
							for frame in 0..frames {
								let offset = (frame * channels + ch) * size;
								plane.extend_from_slice(&packed[offset..offset + size]);
							}
							Bytes::from(plane)
						})
						.collect()
				}
			};

			self.outputs.push(AudioData {
				timestamp: decoded.pts().unwrap_or_default().max(0) as u64,
				frames,
				channels,
			});
		}
	}
}

impl Decoder for AudioDecoder {
	type Config = AudioConfig;
	type Output = AudioData;

	fn configure(&mut self, config: &AudioConfig) -> Result<(), DecodeError> {
		let codec_id = match config.codec {
			AudioCodec::Aac { .. } => ffmpeg::codec::Id::AAC,
			AudioCodec::Opus => ffmpeg::codec::Id::OPUS,
		};

		let context = context(codec_id, config.description.as_deref())?;
		let decoder = context
			.decoder()
			.audio()
			.map_err(|e| DecodeError::Configure(format!("not an audio codec: {e}")))?;

		self.decoder = Some(decoder);
		Ok(())
	}

	fn decode(&mut self, chunk: Chunk) {
		let Some(decoder) = self.decoder.as_mut() else {
			return;
		};

		if let Err(err) = decoder.send_packet(&packet(&chunk)) {
			self.errors.push(DecodeError::Chunk {
				timestamp: chunk.timestamp,
				reason: err.to_string(),
			});
		}

		self.receive();
	}

	fn flush(&mut self) -> impl Future<Output = Flushed<Self::Output>> + Send {
		if let Some(Err(err)) = self.decoder.as_mut().map(|decoder| decoder.send_eof()) {
			tracing::warn!(%err, "failed to flush audio decoder");
		}

		self.receive();

		std::future::ready(Flushed {
			outputs: std::mem::take(&mut self.outputs),
			errors: std::mem::take(&mut self.errors),
		})
	}

	fn close(&mut self) {
		self.decoder.take();
	}
}
