use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// A timeline of media objects, measured in frames at [`Movie::fps`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
	pub fps: f64,
	pub width: u32,
	pub height: u32,

	/// Background color as `0xRRGGBB`.
	#[serde(default)]
	pub background: u32,

	#[serde(default)]
	pub objects: Vec<MediaObject>,
}

impl Movie {
	/// Parse a movie from JSON, rejecting timelines that can't be played.
	pub fn from_json(json: &str) -> Result<Self> {
		let movie: Self = serde_json::from_str(json).map_err(|err| Error::Movie(err.to_string()))?;
		movie.validate()?;
		Ok(movie)
	}

	pub fn validate(&self) -> Result<()> {
		if !self.fps.is_finite() || self.fps <= 0.0 {
			return Err(Error::Movie(format!("invalid fps: {}", self.fps)));
		}

		let mut ids = std::collections::HashSet::new();
		for object in &self.objects {
			if !ids.insert(object.id()) {
				return Err(Error::Movie(format!("duplicate object: {}", object.id())));
			}
		}

		Ok(())
	}

	pub fn object(&self, id: &str) -> Option<&MediaObject> {
		self.objects.iter().find(|object| object.id() == id)
	}

	/// The last frame of the timeline, exclusive.
	pub fn duration(&self) -> u64 {
		self.objects.iter().map(MediaObject::end).max().unwrap_or_default()
	}

	/// The wall-clock offset of a frame.
	pub fn time(&self, frame: u64) -> Duration {
		Duration::from_secs_f64(frame as f64 / self.fps)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
	pub x: f64,
	pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
	pub width: f64,
	pub height: f64,
}

/// Where a visual object sits on the stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
	pub position: Option<Position>,
	pub size: Option<Size>,
	pub opacity: Option<f64>,
	pub rotation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
	pub size: f64,
	pub color: String,
	#[serde(default = "Font::default_weight")]
	pub weight: String,
	pub family: String,
}

impl Font {
	fn default_weight() -> String {
		"400".to_string()
	}
}

/// The kind of a [`MediaObject`], used to pick its renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MediaKind {
	#[display("image")]
	Image,
	#[display("text")]
	Text,
	#[display("video")]
	Video,
	#[display("audio")]
	Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaObject {
	Image {
		id: String,
		start: u64,
		duration: u64,
		src: Url,
		#[serde(flatten)]
		layout: Layout,
	},
	Text {
		id: String,
		start: u64,
		duration: u64,
		text: String,
		font: Font,
		#[serde(flatten)]
		layout: Layout,
	},
	Video {
		id: String,
		start: u64,
		duration: u64,
		src: Url,
		#[serde(flatten)]
		layout: Layout,
	},
	Audio {
		id: String,
		start: u64,
		duration: u64,
		src: Url,
		#[serde(default = "default_volume")]
		volume: f64,
	},
}

fn default_volume() -> f64 {
	1.0
}

impl MediaObject {
	pub fn id(&self) -> &str {
		match self {
			Self::Image { id, .. } | Self::Text { id, .. } | Self::Video { id, .. } | Self::Audio { id, .. } => id,
		}
	}

	pub fn kind(&self) -> MediaKind {
		match self {
			Self::Image { .. } => MediaKind::Image,
			Self::Text { .. } => MediaKind::Text,
			Self::Video { .. } => MediaKind::Video,
			Self::Audio { .. } => MediaKind::Audio,
		}
	}

	/// The first frame the object is on screen.
	pub fn start(&self) -> u64 {
		match self {
			Self::Image { start, .. } | Self::Text { start, .. } | Self::Video { start, .. } | Self::Audio { start, .. } => {
				*start
			}
		}
	}

	pub fn duration(&self) -> u64 {
		match self {
			Self::Image { duration, .. }
			| Self::Text { duration, .. }
			| Self::Video { duration, .. }
			| Self::Audio { duration, .. } => *duration,
		}
	}

	/// The first frame after the object, exclusive.
	pub fn end(&self) -> u64 {
		self.start().saturating_add(self.duration())
	}

	pub fn is_active(&self, frame: u64) -> bool {
		self.start() <= frame && frame < self.end()
	}

	/// Whether the object is active anywhere in `[lo, hi]`.
	pub fn overlaps(&self, lo: u64, hi: u64) -> bool {
		self.start() <= hi && lo < self.end()
	}

	/// The media this object streams from, if any.
	pub fn src(&self) -> Option<&Url> {
		match self {
			Self::Image { src, .. } | Self::Video { src, .. } | Self::Audio { src, .. } => Some(src),
			Self::Text { .. } => None,
		}
	}

	pub fn layout(&self) -> Option<&Layout> {
		match self {
			Self::Image { layout, .. } | Self::Text { layout, .. } | Self::Video { layout, .. } => Some(layout),
			Self::Audio { .. } => None,
		}
	}
}
