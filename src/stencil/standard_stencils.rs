use crate::stencil::*;
use crate::util::*;

/// Explicit diffusion, one stage per iteration.
pub fn heat_1d(
    dt: f64,
    dx: f64,
    k: f64,
) -> Stencil<impl Fn(&[f64; 3], usize) -> f64 + Send + Sync> {
    Stencil::new(move |args: &[f64; 3], _| {
        let left = args[0];
        let middle = args[1];
        let right = args[2];
        middle + (k * dt / (dx * dx)) * (left - 2.0 * middle + right)
    })
}

/// Two stage diffusion on (u, u_half).
/// Even iterations predict the half step into the second component,
/// odd iterations correct `u` with the predicted slope.
/// Pair with `substeps_per_advance = 2`.
pub fn heat_1d_midpoint(
    dt: f64,
    dx: f64,
    k: f64,
) -> Stencil<impl Fn(&[Vector2<f64>; 3], usize) -> Vector2<f64> + Send + Sync> {
    let c = k / (dx * dx);
    Stencil::new(move |args: &[Vector2<f64>; 3], iteration| {
        let middle = args[1];
        if iteration % 2 == 0 {
            let lap = args[0][0] - 2.0 * middle[0] + args[2][0];
            Vector2::new(middle[0], middle[0] + 0.5 * dt * c * lap)
        } else {
            let lap = args[0][1] - 2.0 * middle[1] + args[2][1];
            let u = middle[0] + dt * c * lap;
            Vector2::new(u, u)
        }
    })
}

/// Wave equation on (u, v), symplectic Euler.
pub fn wave_1d(
    dt: f64,
    dx: f64,
    speed: f64,
) -> Stencil<impl Fn(&[Vector2<f64>; 3], usize) -> Vector2<f64> + Send + Sync> {
    let c_sq = speed * speed / (dx * dx);
    Stencil::new(move |args: &[Vector2<f64>; 3], _| {
        let middle = args[1];
        let lap = args[0][0] - 2.0 * middle[0] + args[2][0];
        let v = middle[1] + dt * c_sq * lap;
        Vector2::new(middle[0] + dt * v, v)
    })
}

/// Flux of the 1D Euler equations for (density, momentum, energy).
pub fn euler_flux(state: &Vector3<f64>, gamma: f64) -> Vector3<f64> {
    let rho = state[0];
    let u = state[1] / rho;
    let energy = state[2];
    let pressure = (gamma - 1.0) * (energy - 0.5 * rho * u * u);
    Vector3::new(rho * u, rho * u * u + pressure, u * (energy + pressure))
}

/// Compressible Euler equations on (density, momentum, energy),
/// Lax-Friedrichs.
pub fn euler_1d(
    dt: f64,
    dx: f64,
    gamma: f64,
) -> Stencil<impl Fn(&[Vector3<f64>; 3], usize) -> Vector3<f64> + Send + Sync> {
    let ratio = dt / (2.0 * dx);
    Stencil::new(move |args: &[Vector3<f64>; 3], _| {
        let left = args[0];
        let right = args[2];
        0.5 * (left + right)
            - ratio * (euler_flux(&right, gamma) - euler_flux(&left, gamma))
    })
}
