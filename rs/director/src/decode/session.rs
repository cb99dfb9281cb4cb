use director_mux::Chunk;

use super::{DecodeError, Decoder, Flushed};

/// A configured decoder, scoped to one run of chunks.
///
/// [`Session::finish`] flushes and closes the decoder. If the session is dropped first, whether
/// by an early return or a cancelled future, the decoder is still closed.
pub struct Session<D: Decoder> {
	decoder: Option<D>,
}

impl<D: Decoder> Session<D> {
	/// Configure the decoder. On error, it's closed before returning.
	pub fn open(decoder: D, config: &D::Config) -> Result<Self, DecodeError> {
		let mut session = Self { decoder: Some(decoder) };

		if let Some(decoder) = session.decoder.as_mut() {
			decoder.configure(config)?;
		}

		Ok(session)
	}

	pub fn submit(&mut self, chunk: Chunk) {
		if let Some(decoder) = self.decoder.as_mut() {
			decoder.decode(chunk);
		}
	}

	/// Flush every submitted chunk, then close the decoder.
	pub async fn finish(mut self) -> Flushed<D::Output> {
		let Some(decoder) = self.decoder.as_mut() else {
			return Flushed::default();
		};

		let flushed = decoder.flush().await;

		if let Some(mut decoder) = self.decoder.take() {
			decoder.close();
		}

		flushed
	}
}

impl<D: Decoder> Drop for Session<D> {
	fn drop(&mut self) {
		if let Some(mut decoder) = self.decoder.take() {
			decoder.close();
		}
	}
}
