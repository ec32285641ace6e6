//! Point to point message passing between the processes of a run.
//!
//! Payloads are single field states put on the wire as raw bytes,
//! matched on (source, tag).

mod channel;

pub use channel::*;

use crate::util::*;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    #[error("rank {peer} is not part of this communicator")]
    InvalidPeer { peer: usize },

    #[error("rank {peer} disconnected")]
    Disconnected { peer: usize },

    #[error("payload of {actual} bytes where {expected} were expected")]
    PayloadSize { expected: usize, actual: usize },

    #[error("payload of {size} bytes does not fit a message of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("no message from rank {source_rank} with tag {tag} within the receive timeout")]
    Timeout { source_rank: usize, tag: MessageTag },
}

/// Largest tag space every message passing runtime has to support.
pub const TAG_SPACE: usize = 32768;

/// Offset separating the two directions of one exchange.
pub const DIRECTION_OFFSET: usize = 100;

/// Largest field state a message can carry.
pub const MAX_PAYLOAD_BYTES: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MessageTag(u16);

impl MessageTag {
    fn from_counter(counter: usize) -> Self {
        MessageTag((counter % TAG_SPACE) as u16)
    }

    /// Tag of a value travelling towards the left neighbor.
    pub fn leftward(iteration: usize) -> Self {
        Self::from_counter(iteration)
    }

    /// Tag of a value travelling towards the right neighbor.
    pub fn rightward(iteration: usize) -> Self {
        Self::from_counter(iteration + DIRECTION_OFFSET)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for MessageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// Handle of an issued non-blocking send.
pub trait SendRequest: Send {
    /// Block until the matching receive has taken the message.
    fn wait(self) -> Result<(), CommError>;
}

pub trait Communicator: Send {
    type Request: SendRequest;

    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Non-blocking send, the payload is copied before this returns.
    /// Fails with `PayloadTooLarge` for states over `MAX_PAYLOAD_BYTES`.
    fn isend<S: FieldState>(
        &self,
        dest: usize,
        tag: MessageTag,
        value: &S,
    ) -> Result<Self::Request, CommError>;

    /// Blocking receive of the next message from `source` carrying `tag`.
    fn recv<S: FieldState>(&self, source: usize, tag: MessageTag) -> Result<S, CommError>;
}

/// Communicator of a run with a single process.
/// There is nobody to talk to, every call is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

/// Never produced, `SingleProcess` can not send.
pub enum NoRequest {}

impl SendRequest for NoRequest {
    fn wait(self) -> Result<(), CommError> {
        match self {}
    }
}

impl Communicator for SingleProcess {
    type Request = NoRequest;

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend<S: FieldState>(
        &self,
        dest: usize,
        _tag: MessageTag,
        _value: &S,
    ) -> Result<NoRequest, CommError> {
        Err(CommError::InvalidPeer { peer: dest })
    }

    fn recv<S: FieldState>(&self, source: usize, _tag: MessageTag) -> Result<S, CommError> {
        Err(CommError::InvalidPeer { peer: source })
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn tags_wrap_and_separate() {
        assert_eq!(MessageTag::leftward(5).value(), 5);
        assert_eq!(MessageTag::rightward(5).value(), 105);
        assert_ne!(MessageTag::leftward(7), MessageTag::rightward(7));
        assert_eq!(MessageTag::leftward(TAG_SPACE + 3), MessageTag::leftward(3));
        assert_eq!(
            MessageTag::rightward(TAG_SPACE - 1).value() as usize,
            DIRECTION_OFFSET - 1
        );
    }

    #[test]
    fn single_process_has_no_peers() {
        let comm = SingleProcess;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert!(matches!(
            comm.isend(1, MessageTag::leftward(0), &1.0f64),
            Err(CommError::InvalidPeer { peer: 1 })
        ));
        assert!(comm.recv::<f64>(1, MessageTag::leftward(0)).is_err());
    }
}
