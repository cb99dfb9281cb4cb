//! Decoded media, kept in memory only as long as playback needs it.
mod audio;
mod index;
mod video;
mod window;

pub use audio::*;
pub use index::*;
pub use video::*;
pub use window::*;
