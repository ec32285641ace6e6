use crate::comm::*;
use crate::config::*;
use crate::device::*;
use crate::domain::*;
use crate::error::*;
use crate::halo::*;
use crate::output::*;
use crate::pipeline::SimulationClock;
use crate::step::host_step;
use crate::stencil::*;
use crate::util::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a finished run hands back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub simulated_time: f64,
    /// Iteration counter after the last iteration.
    pub iteration: usize,
    /// Iterations run by this call.
    pub steps: usize,
    pub clock_advances: usize,
    pub output_events: usize,
    /// Faults reported by the accelerator and tolerated by the fault policy.
    pub device_faults: usize,
    pub halo: HaloCounters,
    /// Wall clock time of the loop, output and final synchronization included.
    pub elapsed: Duration,
    /// Interior points updated over the whole run, all partitions.
    pub point_updates: u64,
}

impl RunSummary {
    pub fn time_per_step(&self) -> Duration {
        if self.steps == 0 {
            return Duration::ZERO;
        }
        self.elapsed.div_f64(self.steps as f64)
    }

    pub fn nanos_per_point_update(&self) -> f64 {
        if self.point_updates == 0 {
            return 0.0;
        }
        self.elapsed.as_nanos() as f64 / self.point_updates as f64
    }
}

/// Device resources of one run, created before the loop, dropped after it.
struct AcceleratorLanes<S: FieldState> {
    mirror: DeviceMirror<S>,
    kernel: StepKernel,
    compute: Stream,
    /// left host boundary -> accelerator left ghost
    left_in: Lane<S>,
    /// right host boundary -> accelerator right ghost
    right_in: Lane<S>,
    /// accelerator first interior -> left host right ghost
    left_out: Lane<S>,
    /// accelerator last interior -> right host left ghost
    right_out: Lane<S>,
    in_flight: Option<[Ticket; 4]>,
}

/// A prepared single state transfer with its own stream and staging slot.
struct Lane<S: FieldState> {
    stream: Stream,
    transfer: Transfer,
    staging: HostStaging<S>,
}

impl<S: FieldState> Lane<S> {
    fn new(
        device: &EmulatedDevice,
        mirror: &DeviceMirror<S>,
        name: &str,
        index: usize,
        to_device: bool,
    ) -> Result<Self> {
        let staging = HostStaging::new();
        let transfer = if to_device {
            device.copy_to_device(mirror, index, &staging)
        } else {
            device.copy_to_host(mirror, index, &staging)
        };
        Ok(Lane {
            stream: device.create_stream(name)?,
            transfer,
            staging,
        })
    }

    fn issue(&mut self) -> Result<Ticket> {
        Ok(self.transfer.issue(&mut self.stream)?)
    }
}

impl<S: FieldState> AcceleratorLanes<S> {
    fn new<R: UpdateRule<S> + 'static>(
        device: &EmulatedDevice,
        accel: &Partition<S>,
        rule: &Arc<R>,
        launch: LaunchGeometry,
    ) -> Result<Self> {
        let mirror = device.upload(accel.as_slice())?;
        let last = mirror.len() - 1;
        Ok(AcceleratorLanes {
            kernel: device.launch_step(&mirror, rule, launch),
            compute: device.create_stream("compute")?,
            left_in: Lane::new(device, &mirror, "left in", 0, true)?,
            right_in: Lane::new(device, &mirror, "right in", last, true)?,
            left_out: Lane::new(device, &mirror, "left out", 1, false)?,
            right_out: Lane::new(device, &mirror, "right out", last - 1, false)?,
            mirror,
            in_flight: None,
        })
    }

    /// Queue the four boundary transfers on their own streams.
    fn issue_transfers(
        &mut self,
        left: &Partition<S>,
        right: &Partition<S>,
    ) -> Result<()> {
        self.left_in.staging.put(left.last_interior());
        self.right_in.staging.put(right.first_interior());
        let tickets = [
            self.left_in.issue()?,
            self.right_in.issue()?,
            self.left_out.issue()?,
            self.right_out.issue()?,
        ];
        self.in_flight = Some(tickets);
        Ok(())
    }

    /// Wait for the transfers in flight and land the device values in the
    /// host ghosts, every fault a stream reports goes to `faults`.
    fn settle_transfers(
        &mut self,
        left: &mut Partition<S>,
        right: &mut Partition<S>,
        faults: &mut FaultTracker<'_>,
        iteration: usize,
    ) -> Result<()> {
        let Some([t_left_in, t_right_in, t_left_out, t_right_out]) = self.in_flight.take()
        else {
            return Ok(());
        };
        let waits = [
            self.left_in.stream.wait(t_left_in),
            self.right_in.stream.wait(t_right_in),
            self.left_out.stream.wait(t_left_out),
            self.right_out.stream.wait(t_right_out),
        ];
        if let Some(v) = self.left_out.staging.take() {
            left.set_right_ghost(v);
        }
        if let Some(v) = self.right_out.staging.take() {
            right.set_left_ghost(v);
        }
        for fault in waits.into_iter().filter_map(|w| w.err()) {
            faults.report(iteration, fault)?;
        }
        Ok(())
    }
}

struct FaultTracker<'c> {
    ctx: &'c RunContext,
    count: usize,
}

impl FaultTracker<'_> {
    fn report(&mut self, iteration: usize, fault: DeviceFault) -> Result<()> {
        tracing::error!(
            iteration,
            rank = self.ctx.rank(),
            %fault,
            "accelerator fault"
        );
        self.count += 1;
        let fatal = matches!(
            fault,
            DeviceFault::StreamLost(_) | DeviceFault::Resource(_)
        );
        match self.ctx.config.fault_policy {
            DeviceFaultPolicy::LogAndContinue if !fatal => Ok(()),
            _ => Err(SolverError::DeviceFault { iteration, fault }),
        }
    }
}

fn emit_partition<S: FieldState, O: SolutionSink<S> + ?Sized>(
    partition: &Partition<S>,
    time: f64,
    sink: &mut O,
) -> Result<()> {
    let values = partition.as_slice();
    for k in 1..=partition.interior_len() {
        sink.emit(&values[k], time, k, partition.global_offset())?;
    }
    Ok(())
}

/// Run the classic decomposition until the simulated time reaches the
/// horizon.
///
/// `set` is stepped in place and holds the final state on return, the
/// accelerator partition included. `device` has to be present exactly when
/// the configuration says this process owns an accelerator.
pub fn run_classic<S, R, C, O>(
    ctx: &RunContext,
    set: &mut SubdomainSet<S>,
    start_iteration: usize,
    rule: &Arc<R>,
    comm: &C,
    device: Option<&EmulatedDevice>,
    sink: &mut O,
) -> Result<RunSummary>
where
    S: FieldState,
    R: UpdateRule<S> + 'static,
    C: Communicator,
    O: SolutionSink<S> + ?Sized,
{
    let config = &ctx.config;
    config.validate()?;
    config.check_state::<S>()?;
    set.check_layout(config)?;

    let _span = tracing::info_span!("classic", rank = ctx.rank()).entered();
    tracing::info!(
        accelerator = config.has_accelerator,
        host_points = config.host_points,
        accel_points = config.accel_points,
        start_iteration,
        "classic decomposition"
    );

    let mut clock = SimulationClock::new(
        config.dt,
        config.substeps_per_advance,
        config.output_interval,
        start_iteration,
    );
    let mut halo = HaloExchange::new(comm, ctx);
    let mut faults = FaultTracker { ctx, count: 0 };
    let started;

    match (set, device) {
        (SubdomainSet::Split { left, accel, right }, Some(device)) => {
            let mut lanes = AcceleratorLanes::new(device, accel, rule, config.launch)?;
            started = Instant::now();

            while clock.time() < config.horizon {
                profiling::scope!("classic: iteration");
                let iteration = clock.iteration();

                // Nothing may touch the mirror or the host boundaries while
                // last iteration's transfers and sends are still in flight.
                lanes.settle_transfers(left, right, &mut faults, iteration)?;
                halo.settle()?;

                let kernel = lanes.kernel.launch(&mut lanes.compute, iteration)?;
                host_step(left, &**rule, iteration, config.host_order);
                host_step(right, &**rule, iteration, config.host_order);
                if let Err(fault) = lanes.compute.wait(kernel) {
                    faults.report(iteration, fault)?;
                }

                lanes.issue_transfers(left, right)?;

                halo.pass_right(right, iteration)?;
                halo.pass_left(left, iteration)?;

                clock.tick();

                if clock.output_due() {
                    lanes.settle_transfers(left, right, &mut faults, iteration)?;
                    device.download(&lanes.mirror, accel.as_mut_slice())?;
                    let time = clock.time();
                    tracing::debug!(time, iteration, "output");
                    emit_partition(left, time, sink)?;
                    emit_partition(accel, time, sink)?;
                    emit_partition(right, time, sink)?;
                    clock.mark_output();
                }
            }

            lanes.settle_transfers(left, right, &mut faults, clock.iteration())?;
            halo.settle()?;
            device.download(&lanes.mirror, accel.as_mut_slice())?;
        }
        (SubdomainSet::HostOnly { host }, None) => {
            started = Instant::now();
            while clock.time() < config.horizon {
                profiling::scope!("classic: iteration");
                let iteration = clock.iteration();

                halo.settle()?;
                host_step(host, &**rule, iteration, config.host_order);

                halo.pass_right(host, iteration)?;
                halo.pass_left(host, iteration)?;

                clock.tick();

                if clock.output_due() {
                    let time = clock.time();
                    tracing::debug!(time, iteration, "output");
                    emit_partition(host, time, sink)?;
                    clock.mark_output();
                }
            }
            halo.settle()?;
        }
        (SubdomainSet::Split { .. }, None) => {
            return Err(SolverError::Layout(
                "accelerator partition without a device".to_string(),
            ));
        }
        (SubdomainSet::HostOnly { .. }, Some(_)) => {
            return Err(SolverError::Layout(
                "device given to a host only process".to_string(),
            ));
        }
    }
    let elapsed = started.elapsed();

    let steps = clock.iteration() - start_iteration;
    let summary = RunSummary {
        simulated_time: clock.time(),
        iteration: clock.iteration(),
        steps,
        clock_advances: clock.advances(),
        output_events: clock.outputs(),
        device_faults: faults.count,
        halo: halo.counters(),
        elapsed,
        point_updates: steps as u64 * config.total_points() as u64,
    };
    tracing::info!(
        time = summary.simulated_time,
        iteration = summary.iteration,
        outputs = summary.output_events,
        elapsed_ms = summary.elapsed.as_secs_f64() * 1e3,
        ns_per_point = summary.nanos_per_point_update(),
        "classic decomposition finished"
    );
    Ok(summary)
}
