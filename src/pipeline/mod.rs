//! The per-iteration stepping engine for the classic decomposition.

mod classic;
mod clock;

pub use classic::*;
pub use clock::*;
