use crate::comm::CommError;
use crate::device::DeviceFault;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("invalid run configuration: {0}")]
    Config(String),

    #[error("subdomain layout mismatch: {0}")]
    Layout(String),

    #[error("device fault at iteration {iteration}: {fault}")]
    DeviceFault { iteration: usize, fault: DeviceFault },

    #[error("device error: {0}")]
    Device(#[from] DeviceFault),

    #[error("transport fault: {0}")]
    Transport(#[from] CommError),

    #[error("rank {rank} panicked")]
    RankPanic { rank: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, SolverError>;
