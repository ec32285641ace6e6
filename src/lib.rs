pub mod classic_example;
pub mod comm;
pub mod config;
pub mod device;
pub mod domain;
pub mod driver;
pub mod error;
pub mod halo;
pub mod initial_conditions;
pub mod output;
pub mod pipeline;
pub mod step;
pub mod stencil;
pub mod topology;
pub mod util;

pub use error::*;
