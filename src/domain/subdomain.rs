use crate::config::*;
use crate::domain::*;
use crate::error::*;
use crate::util::*;

/// All partitions owned by one process.
#[derive(Debug, Clone, PartialEq)]
pub enum SubdomainSet<S: FieldState> {
    /// Accelerator partition flanked by two host partitions.
    Split {
        left: Partition<S>,
        accel: Partition<S>,
        right: Partition<S>,
    },
    /// One host partition spanning the whole host allocation.
    HostOnly { host: Partition<S> },
}

impl<S: FieldState> SubdomainSet<S> {
    /// Allocate the partitions `config` asks for, values from `f(global index)`.
    /// `offsets` follows `RankLayout::offsets`.
    pub fn from_fn<F: Fn(usize) -> S>(
        config: &RunConfig,
        offsets: [usize; 3],
        f: F,
    ) -> Self {
        if config.has_accelerator {
            let (left_points, right_points) = config.host_halves();
            SubdomainSet::Split {
                left: Partition::from_fn(left_points, offsets[0], &f),
                accel: Partition::from_fn(config.accel_points, offsets[1], &f),
                right: Partition::from_fn(right_points, offsets[2], &f),
            }
        } else {
            SubdomainSet::HostOnly {
                host: Partition::from_fn(config.host_points, offsets[0], &f),
            }
        }
    }

    /// Allocate with a constant value, offsets laid out contiguously from
    /// `first_offset`.
    pub fn filled(config: &RunConfig, first_offset: usize, fill: S) -> Self {
        let (left_points, _) = config.host_halves();
        let offsets = [
            first_offset,
            first_offset + left_points,
            first_offset + left_points + config.accel_points,
        ];
        Self::from_fn(config, offsets, |_| fill)
    }

    pub fn has_accelerator(&self) -> bool {
        matches!(self, SubdomainSet::Split { .. })
    }

    /// Partitions in left to right order.
    pub fn partitions(&self) -> Vec<&Partition<S>> {
        match self {
            SubdomainSet::Split { left, accel, right } => {
                vec![left, accel, right]
            }
            SubdomainSet::HostOnly { host } => vec![host],
        }
    }

    pub fn interior_points(&self) -> usize {
        self.partitions().iter().map(|p| p.interior_len()).sum()
    }

    /// Interior values of every partition, left to right.
    pub fn gather_interior(&self) -> Vec<S> {
        let mut result = Vec::with_capacity(self.interior_points());
        for p in self.partitions() {
            result.extend_from_slice(p.interior());
        }
        result
    }

    /// Checks lengths against `config`.
    pub fn check_layout(&self, config: &RunConfig) -> Result<()> {
        let fail = |msg: String| Err(SolverError::Layout(msg));
        match self {
            SubdomainSet::Split { left, accel, right } => {
                if !config.has_accelerator {
                    return fail(
                        "split subdomain for a process without accelerator"
                            .to_string(),
                    );
                }
                let (left_points, right_points) = config.host_halves();
                if accel.len() != config.accel_points + 2 {
                    return fail(format!(
                        "accelerator partition has length {}, expected {}",
                        accel.len(),
                        config.accel_points + 2
                    ));
                }
                if left.len() != left_points + 2 || right.len() != right_points + 2
                {
                    return fail(format!(
                        "host partitions have lengths ({}, {}), expected ({}, {})",
                        left.len(),
                        right.len(),
                        left_points + 2,
                        right_points + 2
                    ));
                }
            }
            SubdomainSet::HostOnly { host } => {
                if config.has_accelerator {
                    return fail(
                        "host only subdomain for a process with accelerator"
                            .to_string(),
                    );
                }
                if host.len() != config.host_points + 2 {
                    return fail(format!(
                        "host partition has length {}, expected {}",
                        host.len(),
                        config.host_points + 2
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn split_lengths() {
        let config = RunConfig {
            has_accelerator: true,
            accel_points: 8,
            host_points: 6,
            ..Default::default()
        };
        let set = SubdomainSet::filled(&config, 100, 1.0f64);
        let parts = set.partitions();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 5);
        assert_eq!(parts[1].len(), 10);
        assert_eq!(parts[2].len(), 5);
        assert_eq!(parts[0].global_offset(), 100);
        assert_eq!(parts[1].global_offset(), 103);
        assert_eq!(parts[2].global_offset(), 111);
        assert_eq!(set.interior_points(), 14);
        assert!(set.check_layout(&config).is_ok());
    }

    #[test]
    fn host_only_lengths() {
        let config = RunConfig {
            host_points: 8,
            ..Default::default()
        };
        let set = SubdomainSet::filled(&config, 0, 0.0f64);
        assert!(!set.has_accelerator());
        assert_eq!(set.partitions()[0].len(), 10);
        assert!(set.check_layout(&config).is_ok());

        let other = RunConfig {
            host_points: 9,
            ..Default::default()
        };
        assert!(matches!(
            set.check_layout(&other),
            Err(SolverError::Layout(_))
        ));
    }

    #[test]
    fn gather_is_global_order() {
        let config = RunConfig {
            has_accelerator: true,
            accel_points: 4,
            host_points: 4,
            ..Default::default()
        };
        let set = SubdomainSet::from_fn(&config, [0, 2, 6], |g| g as f64);
        let values = set.gather_interior();
        let expected: Vec<f64> = (0..8).map(|g| g as f64).collect();
        assert_eq!(values, expected);
    }
}
