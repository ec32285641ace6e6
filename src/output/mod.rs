//! Where the solution goes at every output event.
//!
//! The pipeline hands each interior point of each partition to a
//! `SolutionSink` together with the simulated time. What happens next is
//! up to the sink.

mod csv_sink;
mod image_sink;
mod memory_sink;

pub use csv_sink::*;
pub use image_sink::*;
pub use memory_sink::*;

use crate::error::*;
use crate::util::*;

pub trait SolutionSink<S: FieldState> {
    /// `local_index` counts from the left ghost of the partition, so the
    /// global position of the point is `global_offset + local_index - 1`.
    fn emit(
        &mut self,
        value: &S,
        time: f64,
        local_index: usize,
        global_offset: usize,
    ) -> Result<()>;
}

/// Global position of an emitted point.
#[inline]
pub fn global_position(local_index: usize, global_offset: usize) -> usize {
    debug_assert!(local_index > 0);
    global_offset + local_index - 1
}

impl<S: FieldState, T: SolutionSink<S> + ?Sized> SolutionSink<S> for &mut T {
    fn emit(
        &mut self,
        value: &S,
        time: f64,
        local_index: usize,
        global_offset: usize,
    ) -> Result<()> {
        (**self).emit(value, time, local_index, global_offset)
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<S: FieldState> SolutionSink<S> for NullSink {
    fn emit(&mut self, _: &S, _: f64, _: usize, _: usize) -> Result<()> {
        Ok(())
    }
}
