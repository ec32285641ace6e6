use crate::config::LaunchGeometry;
use crate::device::*;
use crate::stencil::*;
use crate::step::parallel_step;
use crate::util::*;
use parking_lot::Mutex;
use std::sync::Arc;

pub const MAX_THREADS_PER_BLOCK: usize = 1024;

/// Static description of an accelerator as reported by its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ordinal: usize,
    pub name: String,
    /// Display devices with a watchdog, unsuitable for long kernels.
    pub kernel_exec_timeout: bool,
}

impl DeviceInfo {
    pub fn new(ordinal: usize, name: &str) -> Self {
        DeviceInfo {
            ordinal,
            name: name.to_string(),
            kernel_exec_timeout: false,
        }
    }
}

struct MirrorBuffers<S> {
    current: Vec<S>,
    next: Vec<S>,
}

/// Device resident copy of a partition, ghosts included.
/// Double buffered so a kernel reads only the previous iteration.
pub struct DeviceMirror<S: FieldState> {
    buffers: Arc<Mutex<MirrorBuffers<S>>>,
    len: usize,
}

impl<S: FieldState> DeviceMirror<S> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn interior_len(&self) -> usize {
        self.len.saturating_sub(2)
    }
}

/// Host side slot a single state transfer reads from or lands in,
/// allocated once and reused every iteration.
/// Must not be touched while a transfer using it is in flight.
pub struct HostStaging<S: FieldState> {
    slot: Arc<Mutex<Option<S>>>,
}

impl<S: FieldState> HostStaging<S> {
    pub fn new() -> Self {
        HostStaging {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Stage the value the next host to device copy sends.
    pub fn put(&self, value: S) {
        *self.slot.lock() = Some(value);
    }

    /// Value of the last completed device to host copy, only valid after
    /// its ticket has been waited on.
    pub fn take(&self) -> Option<S> {
        self.slot.lock().take()
    }
}

impl<S: FieldState> Default for HostStaging<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// One Jacobi step over a mirror interior, ready to be launched.
pub struct StepKernel {
    operation: Arc<dyn Operation>,
}

impl StepKernel {
    /// Queue the step for `iteration`.
    pub fn launch(&self, stream: &mut Stream, iteration: usize) -> Result<Ticket, DeviceFault> {
        stream.submit(&self.operation, iteration)
    }
}

/// A single state copy between a mirror slot and a `HostStaging`.
pub struct Transfer {
    operation: Arc<dyn Operation>,
}

impl Transfer {
    pub fn issue(&self, stream: &mut Stream) -> Result<Ticket, DeviceFault> {
        stream.submit(&self.operation, 0)
    }
}

struct StepOperation<S, R> {
    buffers: Arc<Mutex<MirrorBuffers<S>>>,
    pool: Arc<rayon::ThreadPool>,
    rule: Arc<R>,
    chunk_size: usize,
    checked: Result<(), DeviceFault>,
}

impl<S, R> Operation for StepOperation<S, R>
where
    S: FieldState,
    R: UpdateRule<S> + 'static,
{
    fn run(&self, iteration: usize) -> Result<(), DeviceFault> {
        self.checked.clone()?;
        let mut guard = self.buffers.lock();
        let MirrorBuffers { current, next } = &mut *guard;
        let rule = self.rule.as_ref();
        let chunk_size = self.chunk_size;
        self.pool
            .install(|| parallel_step(current, next, rule, iteration, chunk_size));
        std::mem::swap(current, next);
        Ok(())
    }
}

enum Direction {
    ToDevice,
    ToHost,
}

struct CopyOperation<S> {
    buffers: Arc<Mutex<MirrorBuffers<S>>>,
    slot: Arc<Mutex<Option<S>>>,
    index: usize,
    len: usize,
    direction: Direction,
}

impl<S: FieldState> Operation for CopyOperation<S> {
    fn run(&self, _: usize) -> Result<(), DeviceFault> {
        if self.index >= self.len {
            return Err(DeviceFault::OutOfBounds {
                index: self.index,
                len: self.len,
            });
        }
        match self.direction {
            Direction::ToDevice => {
                let value = (*self.slot.lock()).ok_or(DeviceFault::EmptyStaging)?;
                self.buffers.lock().current[self.index] = value;
            }
            Direction::ToHost => {
                let value = self.buffers.lock().current[self.index];
                *self.slot.lock() = Some(value);
            }
        }
        Ok(())
    }
}

/// Accelerator emulated on a dedicated pool of host threads.
pub struct EmulatedDevice {
    info: DeviceInfo,
    pool: Arc<rayon::ThreadPool>,
    chunk_size: usize,
    max_threads_per_block: usize,
}

impl EmulatedDevice {
    /// `compute_units` threads execute kernels,
    /// `chunk_size` is how many points one task updates.
    pub fn new(
        info: DeviceInfo,
        compute_units: usize,
        chunk_size: usize,
    ) -> Result<Self, DeviceFault> {
        let ordinal = info.ordinal;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(compute_units.max(1))
            .thread_name(move |i| format!("device {ordinal}: unit {i}"))
            .build()
            .map_err(|e| DeviceFault::Resource(e.to_string()))?;
        Ok(EmulatedDevice {
            info,
            pool: Arc::new(pool),
            chunk_size: chunk_size.max(1),
            max_threads_per_block: MAX_THREADS_PER_BLOCK,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn max_threads_per_block(&self) -> usize {
        self.max_threads_per_block
    }

    pub fn create_stream(&self, name: &str) -> Result<Stream, DeviceFault> {
        Stream::new(format!("device {} {}", self.info.ordinal, name))
    }

    /// Allocate a mirror and copy `host` into it, synchronous.
    pub fn upload<S: FieldState>(&self, host: &[S]) -> Result<DeviceMirror<S>, DeviceFault> {
        if host.len() < 2 {
            return Err(DeviceFault::SizeMismatch {
                expected: 2,
                actual: host.len(),
            });
        }
        let buffers = MirrorBuffers {
            current: host.to_vec(),
            next: host.to_vec(),
        };
        Ok(DeviceMirror {
            buffers: Arc::new(Mutex::new(buffers)),
            len: host.len(),
        })
    }

    /// Copy the mirror back into `host`, synchronous.
    /// Waits for a running job holding the mirror, not for queued ones.
    pub fn download<S: FieldState>(
        &self,
        mirror: &DeviceMirror<S>,
        host: &mut [S],
    ) -> Result<(), DeviceFault> {
        if host.len() != mirror.len {
            return Err(DeviceFault::SizeMismatch {
                expected: mirror.len,
                actual: host.len(),
            });
        }
        host.copy_from_slice(&mirror.buffers.lock().current);
        Ok(())
    }

    fn check_geometry(
        &self,
        geometry: LaunchGeometry,
        interior: usize,
    ) -> Result<(), DeviceFault> {
        if geometry.blocks == 0
            || geometry.threads_per_block == 0
            || geometry.threads_per_block > self.max_threads_per_block
        {
            return Err(DeviceFault::InvalidLaunch {
                blocks: geometry.blocks,
                threads_per_block: geometry.threads_per_block,
                max_threads_per_block: self.max_threads_per_block,
            });
        }
        if geometry.units() != interior {
            return Err(DeviceFault::GeometryMismatch {
                units: geometry.units(),
                interior,
            });
        }
        Ok(())
    }

    /// Prepare one Jacobi step of `rule` over the mirror interior.
    /// A bad geometry is raised on the stream at every launch and the
    /// kernel does not run.
    pub fn launch_step<S, R>(
        &self,
        mirror: &DeviceMirror<S>,
        rule: &Arc<R>,
        geometry: LaunchGeometry,
    ) -> StepKernel
    where
        S: FieldState,
        R: UpdateRule<S> + 'static,
    {
        StepKernel {
            operation: Arc::new(StepOperation {
                buffers: mirror.buffers.clone(),
                pool: self.pool.clone(),
                rule: rule.clone(),
                chunk_size: self.chunk_size,
                checked: self.check_geometry(geometry, mirror.interior_len()),
            }),
        }
    }

    /// Prepare a host to device copy from `staging` into slot `index`.
    /// The staged value is read when the copy runs.
    pub fn copy_to_device<S: FieldState>(
        &self,
        mirror: &DeviceMirror<S>,
        index: usize,
        staging: &HostStaging<S>,
    ) -> Transfer {
        self.transfer(mirror, index, staging, Direction::ToDevice)
    }

    /// Prepare a device to host copy of slot `index` into `staging`.
    pub fn copy_to_host<S: FieldState>(
        &self,
        mirror: &DeviceMirror<S>,
        index: usize,
        staging: &HostStaging<S>,
    ) -> Transfer {
        self.transfer(mirror, index, staging, Direction::ToHost)
    }

    fn transfer<S: FieldState>(
        &self,
        mirror: &DeviceMirror<S>,
        index: usize,
        staging: &HostStaging<S>,
        direction: Direction,
    ) -> Transfer {
        Transfer {
            operation: Arc::new(CopyOperation {
                buffers: mirror.buffers.clone(),
                slot: staging.slot.clone(),
                index,
                len: mirror.len,
                direction,
            }),
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::stencil::standard_stencils::heat_1d;
    use float_cmp::assert_approx_eq;

    fn device() -> EmulatedDevice {
        EmulatedDevice::new(DeviceInfo::new(0, "emulated"), 2, 4).unwrap()
    }

    #[test]
    fn upload_download() {
        let dev = device();
        let host: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mirror = dev.upload(&host).unwrap();
        assert_eq!(mirror.len(), 10);
        assert_eq!(mirror.interior_len(), 8);

        let mut back = vec![0.0; 10];
        dev.download(&mirror, &mut back).unwrap();
        assert_eq!(back, host);

        let mut wrong = vec![0.0; 3];
        assert!(matches!(
            dev.download(&mirror, &mut wrong),
            Err(DeviceFault::SizeMismatch { .. })
        ));
    }

    #[test]
    fn kernel_matches_parallel_step() {
        let dev = device();
        let mut stream = dev.create_stream("compute").unwrap();
        let rule = Arc::new(heat_1d(0.1, 1.0, 1.0));
        let mut host: Vec<f64> = (0..18).map(|i| ((i * 5) % 7) as f64).collect();
        let mirror = dev.upload(&host).unwrap();
        let geometry = LaunchGeometry {
            blocks: 4,
            threads_per_block: 4,
        };

        let kernel = dev.launch_step(&mirror, &rule, geometry);
        let mut expected = host.clone();
        let mut scratch = vec![0.0; host.len()];
        for iteration in 0..5 {
            let t = kernel.launch(&mut stream, iteration).unwrap();
            stream.wait(t).unwrap();
            parallel_step(&expected, &mut scratch, rule.as_ref(), iteration, 3);
            std::mem::swap(&mut expected, &mut scratch);
        }
        dev.download(&mirror, &mut host).unwrap();
        for (a, b) in host.iter().zip(expected.iter()) {
            assert_approx_eq!(f64, *a, *b);
        }
    }

    #[test]
    fn bad_geometry_faults_without_running() {
        let dev = device();
        let mut stream = dev.create_stream("compute").unwrap();
        let rule = Arc::new(heat_1d(0.1, 1.0, 1.0));
        let host: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mirror = dev.upload(&host).unwrap();

        let too_wide = LaunchGeometry {
            blocks: 1,
            threads_per_block: 2048,
        };
        let kernel = dev.launch_step(&mirror, &rule, too_wide);
        for iteration in 0..2 {
            let t = kernel.launch(&mut stream, iteration).unwrap();
            assert!(matches!(
                stream.wait(t),
                Err(DeviceFault::InvalidLaunch { .. })
            ));
        }

        let short = LaunchGeometry {
            blocks: 1,
            threads_per_block: 4,
        };
        let t = dev
            .launch_step(&mirror, &rule, short)
            .launch(&mut stream, 0)
            .unwrap();
        assert_eq!(
            stream.wait(t),
            Err(DeviceFault::GeometryMismatch {
                units: 4,
                interior: 8
            })
        );

        let mut back = vec![0.0; 10];
        dev.download(&mirror, &mut back).unwrap();
        assert_eq!(back, host);
    }

    #[test]
    fn transfers() {
        let dev = device();
        let mut to_dev = dev.create_stream("h2d").unwrap();
        let mut to_host = dev.create_stream("d2h").unwrap();
        let host: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let mirror = dev.upload(&host).unwrap();
        let outgoing = HostStaging::new();
        let incoming = HostStaging::new();
        let upload = dev.copy_to_device(&mirror, 0, &outgoing);
        let readback = dev.copy_to_host(&mirror, 0, &incoming);

        let t = upload.issue(&mut to_dev).unwrap();
        assert_eq!(to_dev.wait(t), Err(DeviceFault::EmptyStaging));

        // the same prepared transfers, reused
        for value in [-5.0, 7.0] {
            outgoing.put(value);
            let t = upload.issue(&mut to_dev).unwrap();
            to_dev.wait(t).unwrap();
            let t = readback.issue(&mut to_host).unwrap();
            to_host.wait(t).unwrap();
            assert_eq!(incoming.take(), Some(value));
            assert_eq!(incoming.take(), None);
        }

        let t = dev
            .copy_to_device(&mirror, 6, &outgoing)
            .issue(&mut to_dev)
            .unwrap();
        assert_eq!(
            to_dev.wait(t),
            Err(DeviceFault::OutOfBounds { index: 6, len: 6 })
        );
    }
}
