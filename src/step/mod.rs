//! Step executor, applies an update rule to every interior point once.
//!
//! The host form is a sequential scan over a `Partition`. The parallel form
//! is what the device kernel runs: one unit per interior point, units in any
//! order, so it reads from one buffer and writes another.

use crate::config::StepOrder;
use crate::domain::*;
use crate::stencil::*;
use crate::util::*;
use rayon::prelude::*;

/// Host form over one partition, in place.
pub fn host_step<S: FieldState, R: UpdateRule<S> + ?Sized>(
    partition: &mut Partition<S>,
    rule: &R,
    iteration: usize,
    order: StepOrder,
) {
    profiling::scope!("step::host_step");
    let (values, scratch) = partition.values_and_scratch();
    let n = values.len();
    match order {
        StepOrder::GaussSeidel => {
            for k in 1..n - 1 {
                let args = [values[k - 1], values[k], values[k + 1]];
                values[k] = rule.update(&args, iteration);
            }
        }
        StepOrder::Jacobi => {
            scratch.copy_from_slice(values);
            for k in 1..n - 1 {
                let args = [scratch[k - 1], scratch[k], scratch[k + 1]];
                values[k] = rule.update(&args, iteration);
            }
        }
    }
}

/// Data-parallel form.
/// Interior of `next` is computed from `current` only, the two ghosts are
/// carried over unchanged.
/// `chunk_size` is to break the work into tasks for multi-threading.
pub fn parallel_step<S: FieldState, R: UpdateRule<S> + ?Sized>(
    current: &[S],
    next: &mut [S],
    rule: &R,
    iteration: usize,
    chunk_size: usize,
) {
    profiling::scope!("step::parallel_step");
    debug_assert_eq!(current.len(), next.len());
    debug_assert!(current.len() >= 2);
    let n = current.len();
    next[0] = current[0];
    next[n - 1] = current[n - 1];
    next[1..n - 1]
        .par_chunks_mut(chunk_size.max(1))
        .enumerate()
        .for_each(|(i, next_chunk): (usize, &mut [S])| {
            let offset = 1 + i * chunk_size.max(1);
            for (j, value) in next_chunk.iter_mut().enumerate() {
                let k = offset + j;
                let args = [current[k - 1], current[k], current[k + 1]];
                *value = rule.update(&args, iteration);
            }
        });
}
