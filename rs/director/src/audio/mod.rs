//! Queueing decoded audio onto an output against a playback clock.
mod output;
mod scheduler;

pub use output::*;
pub use scheduler::*;
