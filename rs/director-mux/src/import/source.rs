use std::path::Path;

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use tokio::io::AsyncRead;
use url::Url;

use crate::{Error, Result};

/// A stream of bytes, tagged with their absolute offset as they're read.
pub struct Source {
	stream: BoxStream<'static, Result<Bytes>>,
	offset: u64,
}

impl Source {
	pub fn new<S>(stream: S) -> Self
	where
		S: futures::Stream<Item = Result<Bytes>> + Send + 'static,
	{
		Self {
			stream: stream.boxed(),
			offset: 0,
		}
	}

	/// Open a `file://` or `http(s)://` URL.
	pub async fn open(url: &Url) -> Result<Self> {
		match url.scheme() {
			"file" => {
				let path = url
					.to_file_path()
					.map_err(|_| Error::UnsupportedUrl(url.to_string()))?;
				Self::file(path).await
			}
			#[cfg(feature = "http")]
			"http" | "https" => Self::fetch(url.clone()).await,
			_ => Err(Error::UnsupportedUrl(url.to_string())),
		}
	}

	/// Stream the body of an HTTP GET.
	#[cfg(feature = "http")]
	pub async fn fetch(url: Url) -> Result<Self> {
		tracing::debug!(%url, "fetching");

		let response = reqwest::get(url).await?.error_for_status()?;
		let stream = response.bytes_stream().map_err(Error::from);

		Ok(Self::new(stream))
	}

	pub async fn file(path: impl AsRef<Path>) -> Result<Self> {
		let file = tokio::fs::File::open(path).await?;
		Ok(Self::reader(file))
	}

	pub fn reader<R: AsyncRead + Send + 'static>(reader: R) -> Self {
		let stream = tokio_util::io::ReaderStream::new(reader).map_err(Error::from);
		Self::new(stream)
	}

	/// The absolute offset of the next buffer.
	pub fn offset(&self) -> u64 {
		self.offset
	}

	/// Return the next buffer and its absolute offset, or [`None`] at the end of the stream.
	pub async fn next(&mut self) -> Result<Option<(u64, Bytes)>> {
		loop {
			let Some(data) = self.stream.try_next().await? else {
				return Ok(None);
			};

			if data.is_empty() {
				continue;
			}

			let offset = self.offset;
			self.offset += data.len() as u64;

			return Ok(Some((offset, data)));
		}
	}

	/// Read the remainder of the stream into memory.
	pub async fn read_all(mut self) -> Result<Bytes> {
		let mut buf = BytesMut::new();
		while let Some((_, data)) = self.next().await? {
			buf.extend_from_slice(&data);
		}
		Ok(buf.freeze())
	}
}

impl From<Bytes> for Source {
	fn from(data: Bytes) -> Self {
		Self::new(futures::stream::once(async move { Ok(data) }))
	}
}

impl From<Vec<Bytes>> for Source {
	fn from(buffers: Vec<Bytes>) -> Self {
		Self::new(futures::stream::iter(buffers.into_iter().map(Ok)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn offsets() {
		let mut source = Source::from(vec![
			Bytes::from_static(b"abc"),
			Bytes::new(),
			Bytes::from_static(b"defg"),
		]);

		assert_eq!(source.next().await.unwrap(), Some((0, Bytes::from_static(b"abc"))));
		assert_eq!(source.next().await.unwrap(), Some((3, Bytes::from_static(b"defg"))));
		assert_eq!(source.next().await.unwrap(), None);
		assert_eq!(source.offset(), 7);
	}

	#[tokio::test]
	async fn reader() {
		let source = Source::reader(&b"hello world"[..]);
		assert_eq!(source.read_all().await.unwrap(), Bytes::from_static(b"hello world"));
	}

	#[tokio::test]
	async fn unsupported() {
		let url = Url::parse("ftp://example.com/movie.mp4").unwrap();
		assert!(matches!(Source::open(&url).await, Err(Error::UnsupportedUrl(_))));
	}
}
