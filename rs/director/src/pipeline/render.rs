use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;

use super::{Assets, Font, Layout, MediaObject, Movie};
use crate::cache::FrameBuffer;
use crate::decode::Backend;

/// What a layer shows on a given frame.
#[derive(Debug)]
pub enum Content<'a, F> {
	Image(&'a Bytes),
	Text { text: &'a str, font: &'a Font },
	Video(F),
}

/// The compositor that positions and blends layers on screen.
///
/// Each visible object is one layer, identified by the object id.
pub trait Compositor<F>: Send {
	/// Wherever the composited output is drawn.
	type Surface;

	fn attach(&mut self, surface: Self::Surface, width: u32, height: u32, background: u32);

	fn mount(&mut self, id: &str, layout: &Layout);
	fn unmount(&mut self, id: &str);

	/// Replace the content of a mounted layer.
	fn update(&mut self, id: &str, frame: u64, content: Content<'_, F>);
}

/// Draws one object, chosen by its media type.
pub enum ObjectRenderer<B: Backend> {
	Image {
		layout: Layout,
		image: Bytes,
	},
	Text {
		layout: Layout,
		text: String,
		font: Font,
	},
	Video {
		layout: Layout,
		buffer: Arc<FrameBuffer<B>>,
		fps: f64,
	},
}

impl<B: Backend> ObjectRenderer<B> {
	/// The renderer for an object, or [`None`] if it isn't visible or its asset failed to load.
	pub fn create(object: &MediaObject, assets: &Assets<B>, fps: f64) -> Option<Self> {
		match object {
			MediaObject::Image { id, layout, .. } => Some(Self::Image {
				layout: layout.clone(),
				image: assets.get(id)?.image()?.clone(),
			}),
			MediaObject::Text { text, font, layout, .. } => Some(Self::Text {
				layout: layout.clone(),
				text: text.clone(),
				font: font.clone(),
			}),
			MediaObject::Video { id, layout, .. } => Some(Self::Video {
				layout: layout.clone(),
				buffer: assets.get(id)?.video()?.clone(),
				fps,
			}),
			MediaObject::Audio { .. } => None,
		}
	}

	fn layout(&self) -> &Layout {
		match self {
			Self::Image { layout, .. } | Self::Text { layout, .. } | Self::Video { layout, .. } => layout,
		}
	}

	fn mount<C: Compositor<B::Frame>>(&self, id: &str, compositor: &mut C) {
		compositor.mount(id, self.layout());
	}

	fn update<C: Compositor<B::Frame>>(&self, id: &str, frame: u64, compositor: &mut C) {
		let content = match self {
			Self::Image { image, .. } => Content::Image(image),
			Self::Text { text, font, .. } => Content::Text { text, font },
			Self::Video { buffer, fps, .. } => match buffer.get_frame(frame, *fps) {
				Some(picture) => Content::Video(picture),
				None => {
					// The previous picture stays on screen.
					tracing::trace!(id, frame, "frame not buffered");
					return;
				}
			},
		};

		compositor.update(id, frame, content);
	}
}

/// Drives the compositor from the timeline, one frame at a time.
pub struct MovieRenderer<B: Backend, C> {
	movie: Arc<Movie>,
	renderers: Vec<(String, ObjectRenderer<B>)>,
	compositor: C,

	// What's currently mounted, and the frame it shows.
	mounted: HashSet<String>,
	frame: Option<u64>,
}

impl<B: Backend, C: Compositor<B::Frame>> MovieRenderer<B, C> {
	pub fn new(movie: Arc<Movie>, assets: &Assets<B>, compositor: C) -> Self {
		let renderers = movie
			.objects
			.iter()
			.filter_map(|object| {
				let renderer = ObjectRenderer::create(object, assets, movie.fps)?;
				Some((object.id().to_string(), renderer))
			})
			.collect();

		Self {
			movie,
			renderers,
			compositor,
			mounted: HashSet::new(),
			frame: None,
		}
	}

	pub fn attach(&mut self, surface: C::Surface) {
		self.compositor.attach(surface, self.movie.width, self.movie.height, self.movie.background);
	}

	pub fn compositor(&self) -> &C {
		&self.compositor
	}

	/// The last rendered frame.
	pub fn frame(&self) -> Option<u64> {
		self.frame
	}

	/// Mount, unmount, and update layers to show `frame`. Rendering the same frame twice does nothing.
	pub fn render(&mut self, frame: u64) {
		if self.frame == Some(frame) {
			return;
		}

		let active: HashSet<&str> = self
			.renderers
			.iter()
			.filter(|(id, _)| self.movie.object(id).is_some_and(|object| object.is_active(frame)))
			.map(|(id, _)| id.as_str())
			.collect();

		let removed: Vec<String> = self
			.mounted
			.iter()
			.filter(|id| !active.contains(id.as_str()))
			.cloned()
			.collect();

		for id in &removed {
			self.compositor.unmount(id);
			self.mounted.remove(id);
		}

		for (id, renderer) in &self.renderers {
			if !active.contains(id.as_str()) {
				continue;
			}

			if self.mounted.insert(id.clone()) {
				renderer.mount(id, &mut self.compositor);
			}

			renderer.update(id, frame, &mut self.compositor);
		}

		tracing::trace!(frame, active = self.mounted.len(), removed = removed.len(), "rendered");
		self.frame = Some(frame);
	}
}
