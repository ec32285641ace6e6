//! Runs a whole chain of processes inside one program, one thread per rank,
//! talking over a `ChannelComm` universe.

use crate::comm::*;
use crate::config::*;
use crate::device::*;
use crate::domain::*;
use crate::error::*;
use crate::output::*;
use crate::pipeline::*;
use crate::stencil::*;
use crate::topology::*;
use crate::util::*;
use std::sync::Arc;
use std::time::Duration;

/// What one rank hands back once its run is over.
#[derive(Debug, Clone)]
pub struct RankOutcome<S: FieldState> {
    pub rank: usize,
    pub summary: RunSummary,
    pub records: Vec<OutputRecord<S>>,
    pub set: SubdomainSet<S>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChainOptions {
    pub start_iteration: usize,
    /// Turns a receive that never matches into an error instead of a hang.
    pub receive_timeout: Option<Duration>,
}

/// Interior values of the whole grid, ranks in order.
pub fn gather_global<S: FieldState>(outcomes: &[RankOutcome<S>]) -> Vec<S> {
    let mut result = Vec::new();
    for o in outcomes {
        result.extend(o.set.gather_interior());
    }
    result
}

pub fn run_chain<S, R, F>(
    layouts: &[RankLayout],
    template: &RunConfig,
    rule: Arc<R>,
    devices: Vec<Option<EmulatedDevice>>,
    ic: F,
) -> Result<Vec<RankOutcome<S>>>
where
    S: FieldState,
    R: UpdateRule<S> + 'static,
    F: Fn(usize) -> S + Sync,
{
    run_chain_with_options(
        layouts,
        template,
        rule,
        devices,
        ic,
        ChainOptions::default(),
    )
}

fn run_rank<S, R, F>(
    layout: &RankLayout,
    template: &RunConfig,
    rule: &Arc<R>,
    comm: ChannelComm,
    device: Option<EmulatedDevice>,
    ic: &F,
    start_iteration: usize,
) -> Result<RankOutcome<S>>
where
    S: FieldState,
    R: UpdateRule<S> + 'static,
    F: Fn(usize) -> S + Sync,
{
    let ctx = RunContext::new(layout.config(template), layout.topology)?;
    let mut set = SubdomainSet::from_fn(&ctx.config, layout.offsets, ic);
    let mut sink = MemorySink::new();
    let summary = run_classic(
        &ctx,
        &mut set,
        start_iteration,
        rule,
        &comm,
        device.as_ref(),
        &mut sink,
    )?;
    Ok(RankOutcome {
        rank: ctx.rank(),
        summary,
        records: sink.into_records(),
        set,
    })
}

/// One thread per entry of `layouts`, `devices` holds the accelerator of
/// every rank that has one.
pub fn run_chain_with_options<S, R, F>(
    layouts: &[RankLayout],
    template: &RunConfig,
    rule: Arc<R>,
    devices: Vec<Option<EmulatedDevice>>,
    ic: F,
    options: ChainOptions,
) -> Result<Vec<RankOutcome<S>>>
where
    S: FieldState,
    R: UpdateRule<S> + 'static,
    F: Fn(usize) -> S + Sync,
{
    if devices.len() != layouts.len() {
        return Err(SolverError::Config(format!(
            "{} devices for {} ranks",
            devices.len(),
            layouts.len()
        )));
    }
    for (layout, device) in layouts.iter().zip(devices.iter()) {
        if layout.has_accelerator() != device.is_some() {
            return Err(SolverError::Config(format!(
                "rank {} has accelerator points {} but device present {}",
                layout.topology.rank,
                layout.accel_points,
                device.is_some()
            )));
        }
    }

    let comms: Vec<ChannelComm> = ChannelComm::universe(layouts.len())
        .into_iter()
        .map(|c| match options.receive_timeout {
            Some(t) => c.with_receive_timeout(t),
            None => c,
        })
        .collect();

    tracing::info!(ranks = layouts.len(), "starting chain");
    let results: Vec<Result<RankOutcome<S>>> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(layouts.len());
        for ((layout, comm), device) in layouts.iter().zip(comms).zip(devices) {
            let rule = &rule;
            let ic = &ic;
            let rank = layout.topology.rank;
            let handle = std::thread::Builder::new()
                .name(format!("rank {rank}"))
                .spawn_scoped(scope, move || {
                    run_rank(
                        layout,
                        template,
                        rule,
                        comm,
                        device,
                        ic,
                        options.start_iteration,
                    )
                });
            handles.push((rank, handle));
        }
        handles
            .into_iter()
            .map(|(rank, handle)| match handle {
                Ok(h) => h.join().unwrap_or(Err(SolverError::RankPanic { rank })),
                Err(e) => Err(SolverError::Io(e)),
            })
            .collect()
    });

    // A failing rank takes its neighbors down with transport errors,
    // report the rank that failed first for its own reasons.
    let mut outcomes = Vec::with_capacity(results.len());
    let mut first_error = None;
    for r in results {
        match r {
            Ok(o) => outcomes.push(o),
            Err(e) => {
                let replace = match &first_error {
                    None => true,
                    Some(SolverError::Transport(_)) => {
                        !matches!(e, SolverError::Transport(_))
                    }
                    _ => false,
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }
    }
    if let Some(e) = first_error {
        tracing::error!(error = %e, "chain failed");
        return Err(e);
    }
    Ok(outcomes)
}
