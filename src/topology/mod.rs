//! Static decomposition of a global 1D grid into a chain of processes.
//!
//! Every process owns a contiguous slice of the grid. A process with an
//! accelerator splits its slice into left host / accelerator / right host
//! partitions, a process without one keeps a single host partition.

use crate::config::*;
use crate::error::*;

/// (left neighbor, self, right neighbor)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProcessTopology {
    pub left: Option<usize>,
    pub rank: usize,
    pub right: Option<usize>,
}

impl ProcessTopology {
    /// Position `rank` in a non-periodic chain of `size` processes.
    pub fn chain(rank: usize, size: usize) -> Self {
        debug_assert!(rank < size);
        ProcessTopology {
            left: rank.checked_sub(1),
            rank,
            right: if rank + 1 < size { Some(rank + 1) } else { None },
        }
    }

    pub fn single() -> Self {
        Self::chain(0, 1)
    }

    pub fn boundary_flags(&self) -> BoundaryFlags {
        BoundaryFlags {
            left: self.left.is_some(),
            right: self.right.is_some(),
        }
    }
}

/// Where one process sits in the global grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RankLayout {
    pub topology: ProcessTopology,
    pub host_points: usize,
    pub accel_points: usize,
    /// Global index of the first interior point of every partition,
    /// ordered left host, accelerator, right host.
    /// Only the first entry is used by a host only process.
    pub offsets: [usize; 3],
}

impl RankLayout {
    pub fn has_accelerator(&self) -> bool {
        self.accel_points > 0
    }

    pub fn total_points(&self) -> usize {
        self.host_points + self.accel_points
    }

    /// Run configuration for this rank, remaining fields from `template`.
    pub fn config(&self, template: &RunConfig) -> RunConfig {
        let launch = if self.has_accelerator() {
            LaunchGeometry::covering(
                self.accel_points,
                template.launch.threads_per_block,
            )
        } else {
            template.launch
        };
        RunConfig {
            accel_points: self.accel_points,
            host_points: self.host_points,
            boundary: self.topology.boundary_flags(),
            has_accelerator: self.has_accelerator(),
            launch,
            ..template.clone()
        }
    }

    /// Split `global_points` over a chain with one entry of `accelerated`
    /// per process.
    /// An accelerated process weighs `1 + affinity` host shares, its
    /// accelerator partition gets the `affinity` part rounded down to whole
    /// blocks and the points rounded away stay with its own host
    /// allocation. Leftovers of the share rounding go to the last rank.
    pub fn chain(
        global_points: usize,
        accelerated: &[bool],
        affinity: f64,
        threads_per_block: usize,
    ) -> Result<Vec<RankLayout>> {
        let size = accelerated.len();
        if size == 0 {
            return Err(SolverError::Config("no processes".to_string()));
        }
        if affinity < 0.0 || !affinity.is_finite() {
            return Err(SolverError::Config(format!(
                "accelerator affinity must be non negative, got {affinity}"
            )));
        }
        if threads_per_block == 0 {
            return Err(SolverError::Config(
                "threads per block must be non zero".to_string(),
            ));
        }

        let total_weight: f64 = accelerated
            .iter()
            .map(|&a| if a { 1.0 + affinity } else { 1.0 })
            .sum();
        let share = global_points as f64 / total_weight;

        let mut sizes: Vec<(usize, usize)> = accelerated
            .iter()
            .map(|&a| {
                if !a {
                    return (share.floor() as usize, 0);
                }
                let total = (share * (1.0 + affinity)).floor() as usize;
                let blocks =
                    (share * affinity / threads_per_block as f64).floor() as usize;
                let accel = (blocks * threads_per_block).min(total);
                (total - accel, accel)
            })
            .collect();

        let assigned: usize = sizes.iter().map(|(h, a)| h + a).sum();
        debug_assert!(assigned <= global_points);
        if let Some(last) = sizes.last_mut() {
            last.0 += global_points.saturating_sub(assigned);
        }

        let mut layouts = Vec::with_capacity(size);
        let mut start = 0;
        for (rank, (host_points, accel_points)) in sizes.into_iter().enumerate() {
            if (accel_points > 0 && host_points < 2) || host_points == 0 {
                return Err(SolverError::Config(format!(
                    "rank {rank} would own {host_points} host points, grid of {global_points} is too small"
                )));
            }
            let offsets = if accel_points > 0 {
                let left = host_points / 2;
                [start, start + left, start + left + accel_points]
            } else {
                [start, start, start]
            };
            layouts.push(RankLayout {
                topology: ProcessTopology::chain(rank, size),
                host_points,
                accel_points,
                offsets,
            });
            start += host_points + accel_points;
        }
        Ok(layouts)
    }
}
