//! Decoder configuration and track metadata.
//!
//! Configs are serialized in camelCase so they can be handed to a WebCodecs-style decoder as-is.
mod audio;
mod codec;
mod track;
mod video;

pub use audio::*;
pub use codec::*;
pub use track::*;
pub use video::*;
