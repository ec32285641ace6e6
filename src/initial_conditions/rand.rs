use rand::prelude::*;
use rand::rngs::StdRng;

/// Random integer valued point strictly between `-max_val` and `max_val`.
/// Depends on `(seed, position)` alone, so every decomposition of the grid
/// draws the same field.
pub fn rand_value(max_val: i32, seed: u64, position: usize) -> f64 {
    let mut rng = StdRng::seed_from_u64(
        seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ position as u64,
    );
    (rng.gen::<i32>() % max_val.max(1)) as f64
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn bounded_and_reproducible() {
        for position in 0..200 {
            let v = rand_value(10, 3, position);
            assert!(v.abs() < 10.0);
            assert_eq!(v, v.trunc());
            assert_eq!(v, rand_value(10, 3, position));
        }
        assert_eq!(rand_value(0, 1, 5), 0.0);
    }
}
