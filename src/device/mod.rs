//! Accelerator side of a process.
//!
//! The accelerator is modelled as a device with its own memory and its own
//! compute units (a dedicated rayon pool). All device work goes through
//! `Stream`s, ordered queues whose completion has to be waited on
//! explicitly through the `Ticket` every submission returns. Nothing is
//! ordered between two streams unless the caller waits in between.
//!
//! Kernels and transfers are prepared once against a mirror and then
//! queued as often as needed, queueing them does not allocate.

pub mod assignment;
mod emulated;
mod stream;

pub use emulated::*;
pub use stream::*;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceFault {
    #[error("invalid launch configuration: {blocks} blocks of {threads_per_block} threads (max {max_threads_per_block} per block)")]
    InvalidLaunch {
        blocks: usize,
        threads_per_block: usize,
        max_threads_per_block: usize,
    },

    #[error("launch covers {units} units for {interior} interior points")]
    GeometryMismatch { units: usize, interior: usize },

    #[error("device access at {index} outside buffer of length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("host to device copy issued with nothing staged")]
    EmptyStaging,

    #[error("host buffer of length {actual} does not match device buffer of length {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("device resources could not be created: {0}")]
    Resource(String),

    #[error("stream {0} is no longer running")]
    StreamLost(String),
}
