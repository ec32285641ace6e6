use crate::device::DeviceFault;
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Submissions a stream holds before `submit` blocks.
pub const QUEUE_DEPTH: usize = 16;

/// Device work that is built once and queued any number of times.
/// `argument` is the per submission parameter, the iteration of a kernel.
pub trait Operation: Send + Sync {
    fn run(&self, argument: usize) -> Result<(), DeviceFault>;
}

impl<F> Operation for F
where
    F: Fn(usize) -> Result<(), DeviceFault> + Send + Sync,
{
    fn run(&self, argument: usize) -> Result<(), DeviceFault> {
        self(argument)
    }
}

struct Submission {
    seq: u64,
    operation: Arc<dyn Operation>,
    argument: usize,
}

/// Position of a submission in its stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[must_use = "device work has to be waited on before its buffers are reused"]
pub struct Ticket(u64);

#[derive(Default)]
struct ProgressState {
    completed: u64,
    /// Sticky until the next wait reports it.
    fault: Option<DeviceFault>,
    lost: bool,
}

#[derive(Default)]
struct Progress {
    state: Mutex<ProgressState>,
    cv: Condvar,
}

/// In-order device queue with its own worker.
/// Submissions on one stream run one after the other in submission order.
pub struct Stream {
    name: String,
    jobs: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    progress: Arc<Progress>,
    submitted: u64,
}

impl Stream {
    pub(crate) fn new(name: String) -> Result<Self, DeviceFault> {
        let (sender, receiver) = bounded::<Submission>(QUEUE_DEPTH);
        let progress = Arc::new(Progress::default());
        let worker_progress = progress.clone();
        let worker = std::thread::Builder::new()
            .name(format!("stream: {name}"))
            .spawn(move || {
                for job in receiver.iter() {
                    let result = job.operation.run(job.argument);
                    let mut state = worker_progress.state.lock();
                    state.completed = job.seq;
                    if let Err(fault) = result {
                        state.fault.get_or_insert(fault);
                    }
                    worker_progress.cv.notify_all();
                }
            })
            .map_err(|e| DeviceFault::Resource(e.to_string()))?;
        Ok(Stream {
            name,
            jobs: Some(sender),
            worker: Some(worker),
            progress,
            submitted: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `operation`, blocks while `QUEUE_DEPTH` submissions are pending.
    pub fn submit(
        &mut self,
        operation: &Arc<dyn Operation>,
        argument: usize,
    ) -> Result<Ticket, DeviceFault> {
        self.submitted += 1;
        let job = Submission {
            seq: self.submitted,
            operation: operation.clone(),
            argument,
        };
        let sent = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send(job).is_ok())
            .unwrap_or(false);
        if !sent {
            self.progress.state.lock().lost = true;
            return Err(DeviceFault::StreamLost(self.name.clone()));
        }
        Ok(Ticket(self.submitted))
    }

    /// Block until `ticket` has run.
    /// Reports, and clears, the first fault raised on this stream since the
    /// last wait, whichever submission raised it.
    pub fn wait(&self, ticket: Ticket) -> Result<(), DeviceFault> {
        let mut state = self.progress.state.lock();
        while state.completed < ticket.0 {
            if state.lost || self.worker.as_ref().map_or(true, |w| w.is_finished()) {
                return Err(DeviceFault::StreamLost(self.name.clone()));
            }
            self.progress
                .cv
                .wait_for(&mut state, std::time::Duration::from_millis(50));
        }
        match state.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Wait for everything submitted so far.
    pub fn synchronize(&self) -> Result<(), DeviceFault> {
        self.wait(Ticket(self.submitted))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain and exit.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn jobs_run_in_order() {
        let mut stream = Stream::new("test".to_string()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let record: Arc<dyn Operation> = Arc::new(move |i: usize| -> Result<(), DeviceFault> {
            sink.lock().push(i);
            Ok(())
        });
        // more than the queue holds at once
        let mut last = None;
        for i in 0..3 * QUEUE_DEPTH {
            last = Some(stream.submit(&record, i).unwrap());
        }
        stream.wait(last.unwrap()).unwrap();
        assert_eq!(*log.lock(), (0..3 * QUEUE_DEPTH).collect::<Vec<_>>());
    }

    #[test]
    fn fault_is_sticky_until_read() {
        let mut stream = Stream::new("faulty".to_string()).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let failing: Arc<dyn Operation> =
            Arc::new(|_: usize| -> Result<(), DeviceFault> {
            Err(DeviceFault::OutOfBounds { index: 9, len: 3 })
        });
        let counter = ran.clone();
        let counting: Arc<dyn Operation> = Arc::new(move |_: usize| -> Result<(), DeviceFault> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let t1 = stream.submit(&failing, 0).unwrap();
        let t2 = stream.submit(&counting, 0).unwrap();
        assert!(t1 < t2);
        assert_eq!(
            stream.wait(t2),
            Err(DeviceFault::OutOfBounds { index: 9, len: 3 })
        );
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(stream.wait(t2), Ok(()));
        assert_eq!(stream.synchronize(), Ok(()));
    }
}
