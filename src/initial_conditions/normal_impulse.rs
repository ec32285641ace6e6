/// Normal like distribution over a grid of `global_points` with the spike
/// in the middle, all values are in [0, 1].
pub fn normal_value(variance: f64, global_points: usize, position: usize) -> f64 {
    let n_f = global_points as f64;
    let sigma_sq: f64 = (n_f / variance) * (n_f / variance);
    let x = (position as f64) - (n_f / 2.0);
    let exp = -x * x / (2.0 * sigma_sq);
    exp.exp()
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn peak_in_the_middle() {
        assert_approx_eq!(f64, normal_value(4.0, 100, 50), 1.0);
        let left = normal_value(4.0, 100, 40);
        let right = normal_value(4.0, 100, 60);
        assert_approx_eq!(f64, left, right);
        assert!(left < 1.0 && left > 0.0);
        assert!(normal_value(4.0, 100, 0) < left);
    }
}
