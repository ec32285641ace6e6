use crate::comm::*;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unmatched messages one rank may have queued towards one peer,
/// `isend` blocks beyond that.
/// Completion is tracked for the last `IN_FLIGHT` sends of every pair.
pub const IN_FLIGHT: usize = 64;

struct Envelope {
    tag: MessageTag,
    /// Position of the message in its pair, counting from 1.
    seq: u64,
    len: usize,
    payload: [u8; MAX_PAYLOAD_BYTES],
}

struct LinkState {
    /// Highest sequence number matched in every slot, `seq % IN_FLIGHT`.
    matched: [u64; IN_FLIGHT],
    receiver_gone: bool,
}

/// Delivery bookkeeping of one ordered pair, shared by both ends.
struct Link {
    state: Mutex<LinkState>,
    delivered: Condvar,
}

impl Link {
    fn new() -> Arc<Self> {
        Arc::new(Link {
            state: Mutex::new(LinkState {
                matched: [0; IN_FLIGHT],
                receiver_gone: false,
            }),
            delivered: Condvar::new(),
        })
    }

    fn slot(seq: u64) -> usize {
        (seq % IN_FLIGHT as u64) as usize
    }

    fn mark(&self, seq: u64) {
        let mut state = self.state.lock();
        let slot = &mut state.matched[Self::slot(seq)];
        *slot = (*slot).max(seq);
        self.delivered.notify_all();
    }

    fn close(&self) {
        self.state.lock().receiver_gone = true;
        self.delivered.notify_all();
    }
}

/// Completion handle of a `ChannelComm` send.
pub struct ChannelRequest {
    peer: usize,
    seq: u64,
    link: Arc<Link>,
}

impl ChannelRequest {
    /// Whether the matching receive has taken the message, without blocking.
    pub fn is_delivered(&self) -> bool {
        self.link.state.lock().matched[Link::slot(self.seq)] >= self.seq
    }
}

impl SendRequest for ChannelRequest {
    fn wait(self) -> Result<(), CommError> {
        let mut state = self.link.state.lock();
        loop {
            if state.matched[Link::slot(self.seq)] >= self.seq {
                return Ok(());
            }
            if state.receiver_gone {
                return Err(CommError::Disconnected { peer: self.peer });
            }
            self.link.delivered.wait(&mut state);
        }
    }
}

struct Outbox {
    sender: Sender<Envelope>,
    link: Arc<Link>,
    sent: AtomicU64,
}

struct Inbox {
    receiver: Receiver<Envelope>,
    link: Arc<Link>,
}

/// In-process message passing, one endpoint per rank, every rank usually
/// driven by its own thread.
///
/// Every ordered pair of ranks has its own bounded channel and delivery
/// record, so a rank that goes away is seen as disconnected by exactly the
/// peers waiting on it. Everything is allocated by `universe`, sending and
/// receiving do not allocate.
pub struct ChannelComm {
    rank: usize,
    /// Indexed by source rank, `None` at our own rank.
    inboxes: Vec<Option<Inbox>>,
    /// Indexed by destination rank, `None` at our own rank.
    outboxes: Vec<Option<Outbox>>,
    /// Arrived but not yet matched, per source, in arrival order.
    unmatched: Mutex<Vec<Vec<Envelope>>>,
    timeout: Option<Duration>,
}

impl ChannelComm {
    /// Fully connected endpoints for ranks `0..size`.
    pub fn universe(size: usize) -> Vec<ChannelComm> {
        let mut inboxes: Vec<Vec<Option<Inbox>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut outboxes: Vec<Vec<Option<Outbox>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for source in 0..size {
            for dest in 0..size {
                if source != dest {
                    let (sender, receiver) = bounded(IN_FLIGHT);
                    let link = Link::new();
                    outboxes[source][dest] = Some(Outbox {
                        sender,
                        link: link.clone(),
                        sent: AtomicU64::new(0),
                    });
                    inboxes[dest][source] = Some(Inbox { receiver, link });
                }
            }
        }
        inboxes
            .into_iter()
            .zip(outboxes)
            .enumerate()
            .map(|(rank, (inboxes, outboxes))| ChannelComm {
                rank,
                inboxes,
                outboxes,
                unmatched: Mutex::new(
                    (0..size).map(|_| Vec::with_capacity(IN_FLIGHT)).collect(),
                ),
                timeout: None,
            })
            .collect()
    }

    /// Give up on a receive after `timeout`.
    /// Without it a receive whose sender never shows up blocks for good.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn decode<S: FieldState>(envelope: &Envelope, link: &Link) -> Result<S, CommError> {
        let expected = state_size::<S>();
        if envelope.len != expected {
            return Err(CommError::PayloadSize {
                expected,
                actual: envelope.len,
            });
        }
        let value = bytemuck::pod_read_unaligned(&envelope.payload[..envelope.len]);
        link.mark(envelope.seq);
        Ok(value)
    }
}

impl Drop for ChannelComm {
    fn drop(&mut self) {
        for inbox in self.inboxes.iter().flatten() {
            inbox.link.close();
        }
    }
}

impl Communicator for ChannelComm {
    type Request = ChannelRequest;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn isend<S: FieldState>(
        &self,
        dest: usize,
        tag: MessageTag,
        value: &S,
    ) -> Result<ChannelRequest, CommError> {
        let outbox = self
            .outboxes
            .get(dest)
            .and_then(|o| o.as_ref())
            .ok_or(CommError::InvalidPeer { peer: dest })?;
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(CommError::PayloadTooLarge {
                size: bytes.len(),
                limit: MAX_PAYLOAD_BYTES,
            });
        }
        let mut payload = [0u8; MAX_PAYLOAD_BYTES];
        payload[..bytes.len()].copy_from_slice(bytes);
        let seq = outbox.sent.fetch_add(1, Ordering::Relaxed) + 1;
        outbox
            .sender
            .send(Envelope {
                tag,
                seq,
                len: bytes.len(),
                payload,
            })
            .map_err(|_| CommError::Disconnected { peer: dest })?;
        Ok(ChannelRequest {
            peer: dest,
            seq,
            link: outbox.link.clone(),
        })
    }

    fn recv<S: FieldState>(&self, source: usize, tag: MessageTag) -> Result<S, CommError> {
        let inbox = self
            .inboxes
            .get(source)
            .and_then(|i| i.as_ref())
            .ok_or(CommError::InvalidPeer { peer: source })?;
        {
            let mut unmatched = self.unmatched.lock();
            let stash = &mut unmatched[source];
            if let Some(i) = stash.iter().position(|e| e.tag == tag) {
                let envelope = stash.remove(i);
                return Self::decode(&envelope, &inbox.link);
            }
        }
        loop {
            let envelope = match self.timeout {
                Some(timeout) => {
                    inbox.receiver.recv_timeout(timeout).map_err(|e| match e {
                        RecvTimeoutError::Timeout => CommError::Timeout {
                            source_rank: source,
                            tag,
                        },
                        RecvTimeoutError::Disconnected => {
                            CommError::Disconnected { peer: source }
                        }
                    })?
                }
                None => inbox
                    .receiver
                    .recv()
                    .map_err(|_| CommError::Disconnected { peer: source })?,
            };
            if envelope.tag == tag {
                return Self::decode(&envelope, &inbox.link);
            }
            self.unmatched.lock()[source].push(envelope);
        }
    }
}
