//! Initial fields as functions of the global point index, so every
//! decomposition of the same grid starts from the same values.

pub mod normal_impulse;
pub mod rand;
use clap::ValueEnum;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum ICType {
    #[default]
    Zero,
    Rand {
        max_val: i32,
    },
    Impulse {
        variance: f64,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum, Default)]
pub enum ClapICType {
    #[default]
    Zero,
    Rand,
    Impulse,
}

impl ClapICType {
    pub fn to_ic_type(&self, dial: f64) -> ICType {
        match self {
            ClapICType::Zero => ICType::Zero,
            ClapICType::Rand => ICType::Rand {
                max_val: dial as i32,
            },
            ClapICType::Impulse => ICType::Impulse { variance: dial },
        }
    }
}

impl ICType {
    /// Value of every global index of a grid of `global_points`.
    /// `seed` only matters for `Rand`.
    pub fn generator(
        self,
        global_points: usize,
        seed: u64,
    ) -> impl Fn(usize) -> f64 + Send + Sync + Clone {
        move |position| match self {
            ICType::Zero => 0.0,
            ICType::Rand { max_val } => {
                rand::rand_value(max_val, seed, position)
            }
            ICType::Impulse { variance } => {
                normal_impulse::normal_value(variance, global_points, position)
            }
        }
    }
}
