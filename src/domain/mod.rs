//! This module has the buffers a process owns.
//! Every partition is a contiguous piece of the global field with one
//! ghost slot at each end. Slot 0 and slot `len - 1` hold the neighbor's
//! boundary adjacent value, they are written by exchanges and transfers,
//! never by the step executor.

mod partition;
mod subdomain;

pub use partition::*;
pub use subdomain::*;
