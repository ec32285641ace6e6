//! Halo exchange with the neighboring processes of the chain.
//!
//! Per edge: a non-blocking send of the boundary adjacent interior value,
//! then a blocking receive of the neighbor's value into the ghost slot.
//! Receives block, so every process has to run the right edge before the
//! left edge, every iteration. Edges without a neighbor do nothing, their
//! ghost keeps whatever the boundary condition put there.

use crate::comm::*;
use crate::config::*;
use crate::domain::*;
use crate::error::*;
use crate::topology::ProcessTopology;
use crate::util::*;

/// Messages moved so far, per edge.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HaloCounters {
    pub left_sends: usize,
    pub left_receives: usize,
    pub right_sends: usize,
    pub right_receives: usize,
}

pub struct HaloExchange<'a, C: Communicator> {
    comm: &'a C,
    topology: ProcessTopology,
    boundary: BoundaryFlags,
    policy: SendPolicy,
    /// Outstanding sends, (left edge, right edge).
    pending: (Option<C::Request>, Option<C::Request>),
    counters: HaloCounters,
    trace: bool,
}

impl<'a, C: Communicator> HaloExchange<'a, C> {
    pub fn new(comm: &'a C, ctx: &RunContext) -> Self {
        HaloExchange {
            comm,
            topology: ctx.topology,
            boundary: ctx.config.boundary,
            policy: ctx.config.send_policy,
            pending: (None, None),
            counters: HaloCounters::default(),
            trace: ctx.is_root(),
        }
    }

    pub fn counters(&self) -> HaloCounters {
        self.counters
    }

    fn neighbor(&self, neighbor: Option<usize>, edge: &str) -> Result<usize> {
        neighbor.ok_or_else(|| {
            SolverError::Config(format!(
                "{edge} boundary flag set on rank {} without a {edge} neighbor",
                self.topology.rank
            ))
        })
    }

    fn keep(&self, request: C::Request) -> Option<C::Request> {
        match self.policy {
            SendPolicy::Detached => None,
            SendPolicy::AwaitBeforeReuse => Some(request),
        }
    }

    /// Exchange across the right edge: send the last interior value,
    /// receive the right neighbor's first interior value into the right ghost.
    pub fn pass_right<S: FieldState>(
        &mut self,
        partition: &mut Partition<S>,
        iteration: usize,
    ) -> Result<()> {
        if !self.boundary.right {
            return Ok(());
        }
        profiling::scope!("halo::pass_right");
        let right = self.neighbor(self.topology.right, "right")?;
        debug_assert!(self.pending.1.is_none() || self.policy == SendPolicy::Detached);

        let request = self.comm.isend(
            right,
            MessageTag::rightward(iteration),
            &partition.last_interior(),
        )?;
        self.pending.1 = self.keep(request);
        self.counters.right_sends += 1;
        if self.trace {
            tracing::trace!(iteration, rank = self.topology.rank, "passing a classic step right");
        }

        let ghost = self.comm.recv(right, MessageTag::leftward(iteration))?;
        partition.set_right_ghost(ghost);
        self.counters.right_receives += 1;
        Ok(())
    }

    /// Exchange across the left edge: send the first interior value,
    /// receive the left neighbor's last interior value into the left ghost.
    pub fn pass_left<S: FieldState>(
        &mut self,
        partition: &mut Partition<S>,
        iteration: usize,
    ) -> Result<()> {
        if !self.boundary.left {
            return Ok(());
        }
        profiling::scope!("halo::pass_left");
        let left = self.neighbor(self.topology.left, "left")?;
        debug_assert!(self.pending.0.is_none() || self.policy == SendPolicy::Detached);

        let request = self.comm.isend(
            left,
            MessageTag::leftward(iteration),
            &partition.first_interior(),
        )?;
        self.pending.0 = self.keep(request);
        self.counters.left_sends += 1;
        if self.trace {
            tracing::trace!(iteration, rank = self.topology.rank, "passing a classic step left");
        }

        let ghost = self.comm.recv(left, MessageTag::rightward(iteration))?;
        partition.set_left_ghost(ghost);
        self.counters.left_receives += 1;
        Ok(())
    }

    /// Wait for the sends still in flight.
    /// Has to run before the step executor writes the boundary values again.
    pub fn settle(&mut self) -> Result<()> {
        if let Some(request) = self.pending.0.take() {
            request.wait()?;
        }
        if let Some(request) = self.pending.1.take() {
            request.wait()?;
        }
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.0.is_some() || self.pending.1.is_some()
    }
}
