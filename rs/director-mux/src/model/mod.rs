mod chunk;
mod group;
mod timestamp;

pub use chunk::*;
pub use group::*;
pub use timestamp::*;
