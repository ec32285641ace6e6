use crate::config::*;
use crate::device::assignment::*;
use crate::device::*;
use crate::driver::RankOutcome;
use crate::error::*;
use crate::initial_conditions::*;
use crate::topology::*;
use crate::util::*;
use clap::Parser;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

/// hetstep classic decomposition executable
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory for output files, will be created.
    /// WARNING, if this Directory
    /// already exists, current contents will be removed.
    #[arg(short, long)]
    pub output_dir: std::path::PathBuf,

    /// Number of processes in the chain.
    #[arg(short, long, default_value = "4")]
    pub ranks: usize,

    /// Machines the processes are spread over, in contiguous blocks.
    #[arg(long, default_value = "1")]
    pub nodes: usize,

    /// Emulated accelerators per machine.
    #[arg(long, default_value = "2")]
    pub devices_per_node: usize,

    /// Ranks at the start of every machine that never get an accelerator.
    #[arg(long, default_value = "0")]
    pub reserved_ranks: usize,

    /// Global grid size.
    #[arg(short, long, default_value = "1000")]
    pub domain_size: usize,

    /// Accelerator partition size relative to one host share.
    #[arg(short, long, default_value = "2.0")]
    pub affinity: f64,

    #[arg(long, default_value = "64")]
    pub threads_per_block: usize,

    #[arg(long, default_value = "0.1")]
    pub dt: f64,

    /// Simulated time to stop at.
    #[arg(long, default_value = "1000.0")]
    pub horizon: f64,

    /// Simulated time between output events.
    #[arg(long, default_value = "1.0")]
    pub output_interval: f64,

    #[arg(long, value_enum, default_value_t = ClapICType::Impulse)]
    pub ic_type: ClapICType,

    /// Impulse variance or random max value, depending on the initial condition.
    #[arg(long, default_value = "8.0")]
    pub ic_dial: f64,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Threads of every emulated accelerator.
    #[arg(long, default_value = "2")]
    pub compute_units: usize,

    /// Chunk size to use for parallelism.
    #[arg(short, long, default_value = "256")]
    pub chunk_size: usize,

    /// Write out image, WARNING: we do not check image size, so be reasonable.
    #[arg(short, long)]
    pub write_image: bool,

    /// The number of threads to use.
    #[arg(short, long, default_value = "8")]
    pub threads: usize,
}

/// Installs the log subscriber, `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}

/// Serves profiling scopes to `puffin_viewer` while the returned server lives.
#[cfg(feature = "profile-with-puffin")]
pub fn start_profiler() -> Result<puffin_http::Server> {
    let server_addr = format!("127.0.0.1:{}", puffin_http::DEFAULT_PORT);
    tracing::info!("Run this to view profiling data:  puffin_viewer {server_addr}");
    let server = puffin_http::Server::new(&server_addr)
        .map_err(|e| SolverError::Config(e.to_string()))?;
    profiling::puffin::set_scopes_on(true);
    Ok(server)
}

impl Args {
    pub fn cli_parse(name: &str) -> Result<(Self, PathBuf)> {
        init_tracing();
        tracing::info!(
            example = name,
            git_describe = env!("GIT_DESCRIBE"),
            git_hash = env!("GIT_HASH"),
            "starting"
        );
        let args = Args::parse();

        let _ = std::fs::remove_dir_all(&args.output_dir);
        std::fs::create_dir_all(&args.output_dir)?;

        let mut output_image_path = args.output_dir.clone();
        output_image_path.push(format!("{}.png", name));

        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .map_err(|e| SolverError::Config(e.to_string()))?;

        Ok((args, output_image_path))
    }

    pub fn ic_type(&self) -> ICType {
        self.ic_type.to_ic_type(self.ic_dial)
    }

    pub fn template(&self) -> RunConfig {
        RunConfig {
            dt: self.dt,
            horizon: self.horizon,
            output_interval: self.output_interval,
            launch: LaunchGeometry {
                blocks: 1,
                threads_per_block: self.threads_per_block,
            },
            ..Default::default()
        }
    }

    /// What every rank would report about its machine.
    pub fn rank_reports(&self) -> Vec<RankReport> {
        let nodes = self.nodes.clamp(1, self.ranks.max(1));
        let per_node = self.ranks.div_ceil(nodes);
        (0..self.ranks)
            .map(|rank| {
                let node = rank / per_node;
                RankReport {
                    rank,
                    host: format!("node{node}"),
                    devices: (0..self.devices_per_node)
                        .map(|d| DeviceInfo::new(d, &format!("emulated {node}.{d}")))
                        .collect(),
                }
            })
            .collect()
    }

    /// Binds devices, splits the grid accordingly and brings the devices up.
    pub fn decomposition(
        &self,
    ) -> Result<(Vec<RankLayout>, Vec<Option<EmulatedDevice>>)> {
        let inventory = gather_inventory(&self.rank_reports());
        let bound = assign_devices(&inventory, self.reserved_ranks);
        let accelerated: Vec<bool> = bound.iter().map(|d| d.is_some()).collect();
        let layouts = RankLayout::chain(
            self.domain_size,
            &accelerated,
            self.affinity,
            self.threads_per_block,
        )?;

        let mut devices = Vec::with_capacity(layouts.len());
        for (layout, info) in layouts.iter().zip(bound) {
            // rounding may leave a bound device without points
            let device = match info {
                Some(info) if layout.has_accelerator() => Some(EmulatedDevice::new(
                    info,
                    self.compute_units,
                    self.chunk_size,
                )?),
                _ => None,
            };
            devices.push(device);
        }
        Ok((layouts, devices))
    }

    /// One CSV row per rank with the decomposition and the cost of its run,
    /// so runs over different affinities and sizes can be compared.
    pub fn write_timing<S: FieldState, W: Write>(
        &self,
        output: &mut W,
        layouts: &[RankLayout],
        outcomes: &[RankOutcome<S>],
    ) -> Result<()> {
        writeln!(
            output,
            "rank,domain_size,affinity,threads_per_block,host_points,accel_points,steps,elapsed_s,step_s,ns_per_point"
        )?;
        for (layout, o) in layouts.iter().zip(outcomes) {
            let s = &o.summary;
            writeln!(
                output,
                "{},{},{},{},{},{},{},{},{},{}",
                o.rank,
                self.domain_size,
                self.affinity,
                self.threads_per_block,
                layout.host_points,
                layout.accel_points,
                s.steps,
                s.elapsed.as_secs_f64(),
                s.time_per_step().as_secs_f64(),
                s.nanos_per_point_update(),
            )?;
        }
        Ok(())
    }

    pub fn write_timing_file<S: FieldState>(
        &self,
        path: &Path,
        layouts: &[RankLayout],
        outcomes: &[RankOutcome<S>],
    ) -> Result<()> {
        tracing::info!(?path, "writing timing");
        let mut output = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write_timing(&mut output, layouts, outcomes)?;
        output.flush()?;
        Ok(())
    }
}

/// Logs what every rank spent on its run.
pub fn log_timing<S: FieldState>(outcomes: &[RankOutcome<S>]) {
    for o in outcomes {
        tracing::info!(
            rank = o.rank,
            time = o.summary.simulated_time,
            steps = o.summary.steps,
            outputs = o.summary.output_events,
            elapsed_ms = o.summary.elapsed.as_secs_f64() * 1e3,
            step_us = o.summary.time_per_step().as_secs_f64() * 1e6,
            ns_per_point = o.summary.nanos_per_point_update(),
            "rank finished"
        );
    }
}
