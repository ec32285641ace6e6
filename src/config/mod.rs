//! Per-run parameters.
//! A `RunConfig` is built once before the pipeline starts and only ever
//! borrowed afterwards, so the loop can not observe it changing.

use crate::error::*;
use crate::topology::ProcessTopology;
use crate::util::*;

/// Which edges of this process have a neighboring process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct BoundaryFlags {
    pub left: bool,
    pub right: bool,
}

impl BoundaryFlags {
    pub fn none() -> Self {
        BoundaryFlags {
            left: false,
            right: false,
        }
    }

    pub fn both() -> Self {
        BoundaryFlags {
            left: true,
            right: true,
        }
    }
}

/// Data-parallel launch shape for the accelerator partition.
/// One unit per interior point, so `blocks * threads_per_block`
/// must match the accelerator point count.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub blocks: usize,
    pub threads_per_block: usize,
}

impl LaunchGeometry {
    /// Smallest geometry with `threads_per_block` covering `points` units.
    pub fn covering(points: usize, threads_per_block: usize) -> Self {
        LaunchGeometry {
            blocks: points.div_ceil(threads_per_block.max(1)),
            threads_per_block,
        }
    }

    pub fn units(&self) -> usize {
        self.blocks * self.threads_per_block
    }
}

impl Default for LaunchGeometry {
    fn default() -> Self {
        LaunchGeometry {
            blocks: 1,
            threads_per_block: 64,
        }
    }
}

/// Update order used by the host form of the step executor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StepOrder {
    /// In-place ascending scan, a point sees its already updated left neighbor.
    #[default]
    GaussSeidel,
    /// Every point sees only previous iteration values.
    Jacobi,
}

/// What to do when the accelerator reports a fault after a dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DeviceFaultPolicy {
    #[default]
    FailFast,
    /// Log the fault and keep stepping with whatever the device holds.
    LogAndContinue,
}

/// Handling of the non-blocking halo sends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Payload is copied when the send is issued and the request is dropped.
    Detached,
    /// Requests are kept and waited for before the boundary slot is written again.
    #[default]
    AwaitBeforeReuse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Interior points of the accelerator partition.
    pub accel_points: usize,
    /// Interior points of the host allocation,
    /// split in two halves around the accelerator partition when present.
    pub host_points: usize,
    pub dt: f64,
    /// Simulated time at which the run stops.
    pub horizon: f64,
    pub output_interval: f64,
    /// The clock advances one `dt` every this many iterations.
    pub substeps_per_advance: usize,
    pub boundary: BoundaryFlags,
    pub has_accelerator: bool,
    pub launch: LaunchGeometry,
    /// Bytes per field state.
    pub state_size: usize,
    pub host_order: StepOrder,
    pub fault_policy: DeviceFaultPolicy,
    pub send_policy: SendPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            accel_points: 0,
            host_points: 64,
            dt: 0.01,
            horizon: 1.0,
            output_interval: 0.1,
            substeps_per_advance: 1,
            boundary: BoundaryFlags::none(),
            has_accelerator: false,
            launch: LaunchGeometry::default(),
            state_size: state_size::<f64>(),
            host_order: StepOrder::default(),
            fault_policy: DeviceFaultPolicy::default(),
            send_policy: SendPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Interior points of the (left, right) host partitions.
    pub fn host_halves(&self) -> (usize, usize) {
        let left = self.host_points / 2;
        (left, self.host_points - left)
    }

    /// Interior points owned by this process.
    pub fn total_points(&self) -> usize {
        if self.has_accelerator {
            self.host_points + self.accel_points
        } else {
            self.host_points
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SolverError::Config(msg));
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return fail(format!("dt must be positive and finite, got {}", self.dt));
        }
        if !(self.output_interval > 0.0 && self.output_interval.is_finite()) {
            return fail(format!(
                "output interval must be positive and finite, got {}",
                self.output_interval
            ));
        }
        if !self.horizon.is_finite() {
            return fail(format!("horizon must be finite, got {}", self.horizon));
        }
        if self.substeps_per_advance == 0 {
            return fail("substeps per advance must be at least 1".to_string());
        }
        if self.state_size == 0 {
            return fail("state size must be non zero".to_string());
        }
        if self.has_accelerator {
            let (left, right) = self.host_halves();
            if self.accel_points == 0 {
                return fail("accelerator partition has no points".to_string());
            }
            if left == 0 || right == 0 {
                return fail(format!(
                    "host allocation of {} points can not flank an accelerator partition",
                    self.host_points
                ));
            }
            if self.launch.blocks == 0 || self.launch.threads_per_block == 0 {
                return fail(format!("empty launch geometry {:?}", self.launch));
            }
        } else if self.host_points == 0 {
            return fail("host partition has no points".to_string());
        }
        Ok(())
    }

    /// Checks that `S` is the state this configuration was written for.
    pub fn check_state<S: FieldState>(&self) -> Result<()> {
        if state_size::<S>() != self.state_size {
            return Err(SolverError::Config(format!(
                "state size {} does not match the field state ({} bytes)",
                self.state_size,
                state_size::<S>()
            )));
        }
        if self.state_size > crate::comm::MAX_PAYLOAD_BYTES {
            return Err(SolverError::Config(format!(
                "state size {} exceeds the message payload limit of {} bytes",
                self.state_size,
                crate::comm::MAX_PAYLOAD_BYTES
            )));
        }
        Ok(())
    }
}

/// Everything an operation needs to know about the run,
/// passed explicitly instead of living in globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: RunConfig,
    pub topology: ProcessTopology,
}

impl RunContext {
    pub fn new(config: RunConfig, topology: ProcessTopology) -> Result<Self> {
        config.validate()?;
        let expected = topology.boundary_flags();
        if (config.boundary.left && topology.left.is_none())
            || (config.boundary.right && topology.right.is_none())
        {
            return Err(SolverError::Config(format!(
                "boundary flags {:?} claim a neighbor the topology lacks ({:?})",
                config.boundary, expected
            )));
        }
        Ok(RunContext { config, topology })
    }

    pub fn rank(&self) -> usize {
        self.topology.rank
    }

    /// Diagnostics are only printed by the first process.
    pub fn is_root(&self) -> bool {
        self.topology.rank == 0
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn host_halves_test() {
        let c = RunConfig {
            host_points: 16,
            ..Default::default()
        };
        assert_eq!(c.host_halves(), (8, 8));

        let c = RunConfig {
            host_points: 17,
            ..Default::default()
        };
        assert_eq!(c.host_halves(), (8, 9));
    }

    #[test]
    fn geometry_test() {
        let g = LaunchGeometry::covering(256, 64);
        assert_eq!(g.blocks, 4);
        assert_eq!(g.units(), 256);

        let g = LaunchGeometry::covering(100, 64);
        assert_eq!(g.blocks, 2);
        assert_eq!(g.units(), 128);
    }

    #[test]
    fn validate_test() {
        assert!(RunConfig::default().validate().is_ok());

        let c = RunConfig {
            dt: 0.0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(SolverError::Config(_))));

        let c = RunConfig {
            substeps_per_advance: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = RunConfig {
            has_accelerator: true,
            accel_points: 64,
            host_points: 1,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = RunConfig {
            has_accelerator: true,
            accel_points: 64,
            host_points: 2,
            ..Default::default()
        };
        assert!(c.validate().is_ok());
        assert_eq!(c.total_points(), 66);
    }

    #[test]
    fn state_check_test() {
        let c = RunConfig::default();
        assert!(c.check_state::<f64>().is_ok());
        assert!(c.check_state::<Vector2<f64>>().is_err());

        let wide = RunConfig {
            state_size: state_size::<[f64; 9]>(),
            ..Default::default()
        };
        assert!(wide.check_state::<[f64; 9]>().is_err());
    }

    #[test]
    fn context_rejects_phantom_neighbor() {
        let config = RunConfig {
            boundary: BoundaryFlags::both(),
            ..Default::default()
        };
        let topology = ProcessTopology::chain(0, 2);
        assert!(RunContext::new(config.clone(), topology).is_err());

        let topology = ProcessTopology::chain(1, 3);
        let ctx = RunContext::new(config, topology).unwrap();
        assert!(!ctx.is_root());
    }
}
