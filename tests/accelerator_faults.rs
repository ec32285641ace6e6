use hetstep::comm::*;
use hetstep::config::*;
use hetstep::device::*;
use hetstep::domain::*;
use hetstep::output::*;
use hetstep::pipeline::*;
use hetstep::stencil::standard_stencils::heat_1d;
use hetstep::topology::*;
use hetstep::SolverError;
use std::sync::Arc;

fn context(policy: DeviceFaultPolicy, launch: LaunchGeometry) -> RunContext {
    let config = RunConfig {
        accel_points: 8,
        host_points: 8,
        has_accelerator: true,
        launch,
        dt: 0.01,
        horizon: 0.05,
        output_interval: 0.02,
        fault_policy: policy,
        ..Default::default()
    };
    RunContext::new(config, ProcessTopology::single()).unwrap()
}

fn device() -> EmulatedDevice {
    EmulatedDevice::new(DeviceInfo::new(0, "faulty"), 2, 2).unwrap()
}

fn initial(position: usize) -> f64 {
    position as f64 * 0.25
}

/// Covers 4 of the 8 accelerator points.
fn short_launch() -> LaunchGeometry {
    LaunchGeometry {
        blocks: 1,
        threads_per_block: 4,
    }
}

#[test]
fn fail_fast_stops_at_first_fault() {
    let ctx = context(DeviceFaultPolicy::FailFast, short_launch());
    let mut set = SubdomainSet::filled(&ctx.config, 0, 1.0f64);
    let result = run_classic(
        &ctx,
        &mut set,
        0,
        &Arc::new(heat_1d(0.01, 0.1, 0.3)),
        &SingleProcess,
        Some(&device()),
        &mut NullSink,
    );
    match result {
        Err(SolverError::DeviceFault { iteration, fault }) => {
            assert_eq!(iteration, 0);
            assert_eq!(
                fault,
                DeviceFault::GeometryMismatch {
                    units: 4,
                    interior: 8
                }
            );
        }
        other => panic!("expected a device fault, got {other:?}"),
    }
}

#[test]
fn log_and_continue_keeps_host_going() {
    let ctx = context(DeviceFaultPolicy::LogAndContinue, short_launch());
    let mut set = SubdomainSet::from_fn(&ctx.config, [0, 4, 12], initial);
    let before = set.clone();
    let mut sink: MemorySink<f64> = MemorySink::new();
    let summary = run_classic(
        &ctx,
        &mut set,
        0,
        &Arc::new(heat_1d(0.01, 0.1, 0.3)),
        &SingleProcess,
        Some(&device()),
        &mut sink,
    )
    .unwrap();

    assert_eq!(summary.iteration, 5);
    assert_eq!(summary.device_faults, 5);
    assert_eq!(summary.output_events, 2);
    assert_eq!(sink.records().len(), 2 * 16);

    match (&set, &before) {
        (
            SubdomainSet::Split { left, accel, .. },
            SubdomainSet::Split {
                left: left_before,
                accel: accel_before,
                ..
            },
        ) => {
            // the kernel never ran
            assert_eq!(accel.interior(), accel_before.interior());
            assert_ne!(left.interior(), left_before.interior());
        }
        _ => panic!("split subdomain expected"),
    }
}

#[test]
fn oversized_block_is_an_invalid_launch() {
    let ctx = context(
        DeviceFaultPolicy::FailFast,
        LaunchGeometry {
            blocks: 1,
            threads_per_block: MAX_THREADS_PER_BLOCK + 1,
        },
    );
    let mut set = SubdomainSet::filled(&ctx.config, 0, 0.0f64);
    let result = run_classic(
        &ctx,
        &mut set,
        0,
        &Arc::new(heat_1d(0.01, 0.1, 0.3)),
        &SingleProcess,
        Some(&device()),
        &mut NullSink,
    );
    assert!(matches!(
        result,
        Err(SolverError::DeviceFault {
            fault: DeviceFault::InvalidLaunch { .. },
            ..
        })
    ));
}

#[test]
fn device_presence_must_match() {
    let ctx = context(
        DeviceFaultPolicy::FailFast,
        LaunchGeometry::covering(8, 4),
    );
    let mut set = SubdomainSet::filled(&ctx.config, 0, 0.0f64);
    let rule = Arc::new(heat_1d(0.01, 0.1, 0.3));
    let result = run_classic(
        &ctx,
        &mut set,
        0,
        &rule,
        &SingleProcess,
        None,
        &mut NullSink,
    );
    assert!(matches!(result, Err(SolverError::Layout(_))));

    let host_only = RunContext::new(
        RunConfig {
            host_points: 8,
            ..Default::default()
        },
        ProcessTopology::single(),
    )
    .unwrap();
    let mut set = SubdomainSet::filled(&host_only.config, 0, 0.0f64);
    let result = run_classic(
        &host_only,
        &mut set,
        0,
        &rule,
        &SingleProcess,
        Some(&device()),
        &mut NullSink,
    );
    assert!(matches!(result, Err(SolverError::Layout(_))));
}

#[test]
fn healthy_device_counts_no_faults() {
    let ctx = context(DeviceFaultPolicy::FailFast, LaunchGeometry::covering(8, 4));
    let mut set = SubdomainSet::from_fn(&ctx.config, [0, 4, 12], initial);
    let summary = run_classic(
        &ctx,
        &mut set,
        0,
        &Arc::new(heat_1d(0.01, 0.1, 0.3)),
        &SingleProcess,
        Some(&device()),
        &mut NullSink,
    )
    .unwrap();
    assert_eq!(summary.device_faults, 0);
    assert_eq!(summary.clock_advances, 5);
    assert_eq!(summary.point_updates, 5 * 16);
    assert!(summary.elapsed > std::time::Duration::ZERO);
}
