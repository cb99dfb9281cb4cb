//! Progressive demuxing of MP4 byte streams.
mod avcc;
mod demuxer;
mod mp4;
mod sample;
mod source;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;

pub use avcc::*;
pub use demuxer::*;
pub use mp4::*;
pub use sample::*;
pub use source::*;
